//! Fixtures and a scripted in-process hub for engine tests.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use tokio::sync::Notify;

use hubsync_remote::{
    ChatsPage, ChatsQuery, HubApi, MessagesPage, MessagesQuery, RawChat, RawMessage,
    RawParticipant, RawParticipantList, RemoteError, SendRequest, SendResult,
};
use hubsync_shared::normalize::{compare_sort_keys, BotDenylist};
use hubsync_shared::types::SyncDirection;
use hubsync_store::Database;

use crate::config::EngineConfig;
use crate::normalize::{normalize_chat, normalize_message, NormalizedChat, NormalizedMessage};
use crate::sync::SyncEngine;
use crate::{shared, SharedDb};

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub(crate) fn raw_participant(id: &str, name: &str, is_self: bool) -> RawParticipant {
    RawParticipant {
        id: Some(id.into()),
        full_name: Some(name.into()),
        is_self,
        ..Default::default()
    }
}

/// A message whose timestamp is `t0 + sort_key` seconds.
pub(crate) fn raw_message(id: &str, sort_key: &str, is_sender: bool) -> RawMessage {
    let offset = sort_key.parse::<i64>().unwrap_or(0);
    RawMessage {
        id: Some(id.into()),
        sender_id: Some(if is_sender { "@me" } else { "@alice" }.into()),
        sender_name: Some(if is_sender { "Me" } else { "Alice" }.into()),
        timestamp: Some(rfc3339(t0() + Duration::seconds(offset))),
        sort_key: Some(sort_key.into()),
        text: json!(format!("message {id}")),
        is_sender: Some(is_sender),
        ..Default::default()
    }
}

/// A single chat with Alice, active `minute` minutes after `t0`.
pub(crate) fn raw_chat(id: &str, title: &str, minute: i64) -> RawChat {
    RawChat {
        id: Some(id.into()),
        account_id: Some("whatsapp".into()),
        network: Some("WhatsApp".into()),
        title: Some(title.into()),
        chat_type: Some("single".into()),
        participants: Some(RawParticipantList {
            items: vec![
                raw_participant("@me", "Me", true),
                raw_participant("@alice", "Alice", false),
            ],
            has_more: false,
            total: Some(2),
        }),
        last_activity: Some(rfc3339(t0() + Duration::minutes(minute))),
        ..Default::default()
    }
}

pub(crate) fn normalized_chat(id: &str, minute: i64) -> NormalizedChat {
    normalize_chat(&raw_chat(id, &format!("Chat {id}"), minute), &BotDenylist::default()).unwrap()
}

pub(crate) fn normalized_message(
    chat_id: &str,
    id: &str,
    sort_key: &str,
    from_user: bool,
) -> NormalizedMessage {
    normalize_message(&raw_message(id, sort_key, from_user), chat_id, "whatsapp").unwrap()
}

pub(crate) fn chats_page(items: Vec<RawChat>, newest: &str, oldest: &str, has_more: bool) -> ChatsPage {
    ChatsPage {
        items,
        newest_cursor: Some(newest.into()),
        oldest_cursor: Some(oldest.into()),
        has_more,
    }
}

type ChatScript = Box<dyn FnMut(&ChatsQuery) -> Result<ChatsPage, RemoteError> + Send>;
type ErrorFactory = fn() -> RemoteError;

/// Lets a test hold the first chat-page request open.
#[derive(Clone, Default)]
pub(crate) struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

/// Scripted hub. Chat pages come from a closure; messages are served from
/// an in-memory history with sort-key cursors like the real hub.
pub(crate) struct FakeHub {
    chats: Mutex<ChatScript>,
    chat_details: Mutex<HashMap<String, RawChat>>,
    messages: Mutex<HashMap<String, Vec<RawMessage>>>,
    message_failures: Mutex<HashMap<String, ErrorFactory>>,
    send_failure: Mutex<Option<ErrorFactory>>,
    gate: Option<Gate>,
    gate_passed: AtomicBool,
    pub chat_queries: Mutex<Vec<ChatsQuery>>,
    pub message_queries: Mutex<Vec<(String, MessagesQuery)>>,
    pub detail_requests: Mutex<Vec<String>>,
    pub sent: Mutex<Vec<(String, SendRequest)>>,
    pub focused: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeHub {
    pub(crate) fn new() -> Self {
        Self {
            chats: Mutex::new(Box::new(|_| Ok(ChatsPage::default()))),
            chat_details: Mutex::new(HashMap::new()),
            messages: Mutex::new(HashMap::new()),
            message_failures: Mutex::new(HashMap::new()),
            send_failure: Mutex::new(None),
            gate: None,
            gate_passed: AtomicBool::new(false),
            chat_queries: Mutex::new(Vec::new()),
            message_queries: Mutex::new(Vec::new()),
            detail_requests: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            focused: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn on_chats<F>(self, script: F) -> Self
    where
        F: FnMut(&ChatsQuery) -> Result<ChatsPage, RemoteError> + Send + 'static,
    {
        *self.chats.lock().unwrap() = Box::new(script);
        self
    }

    /// Serve `pages` in order, then empty pages.
    pub(crate) fn with_chat_pages(self, pages: Vec<ChatsPage>) -> Self {
        let mut pages: VecDeque<ChatsPage> = pages.into();
        self.on_chats(move |_| Ok(pages.pop_front().unwrap_or_default()))
    }

    pub(crate) fn with_chat_detail(self, chat: RawChat) -> Self {
        let id = chat.id.clone().unwrap();
        self.chat_details.lock().unwrap().insert(id, chat);
        self
    }

    pub(crate) fn with_messages(self, chat_id: &str, messages: Vec<RawMessage>) -> Self {
        self.messages
            .lock()
            .unwrap()
            .insert(chat_id.to_string(), messages);
        self
    }

    pub(crate) fn fail_messages(self, chat_id: &str, error: ErrorFactory) -> Self {
        self.message_failures
            .lock()
            .unwrap()
            .insert(chat_id.to_string(), error);
        self
    }

    pub(crate) fn gated(mut self) -> (Self, Gate) {
        let gate = Gate::default();
        self.gate = Some(gate.clone());
        (self, gate)
    }

    pub(crate) fn set_send_failure(&self, error: Option<ErrorFactory>) {
        *self.send_failure.lock().unwrap() = error;
    }

    pub(crate) fn chat_query_count(&self) -> usize {
        self.chat_queries.lock().unwrap().len()
    }

    pub(crate) fn message_query_count(&self) -> usize {
        self.message_queries.lock().unwrap().len()
    }
}

fn key_of(message: &RawMessage) -> &str {
    message.sort_key.as_deref().unwrap_or("")
}

fn message_page(history: &[RawMessage], query: &MessagesQuery) -> MessagesPage {
    let mut sorted = history.to_vec();
    sorted.sort_by(|a, b| compare_sort_keys(key_of(a), key_of(b)));
    let limit = query.limit.unwrap_or(20) as usize;

    let (mut window, has_more) = match (&query.cursor, query.direction) {
        (Some(cursor), Some(SyncDirection::After)) => {
            let newer: Vec<_> = sorted
                .into_iter()
                .filter(|m| compare_sort_keys(key_of(m), cursor) == Ordering::Greater)
                .collect();
            let has_more = newer.len() > limit;
            (newer.into_iter().take(limit).collect::<Vec<_>>(), has_more)
        }
        (cursor, _) => {
            let older: Vec<_> = sorted
                .into_iter()
                .filter(|m| {
                    cursor
                        .as_deref()
                        .map_or(true, |c| compare_sort_keys(key_of(m), c) == Ordering::Less)
                })
                .collect();
            let has_more = older.len() > limit;
            let start = older.len().saturating_sub(limit);
            (older[start..].to_vec(), has_more)
        }
    };
    window.reverse();
    MessagesPage {
        items: window,
        has_more,
    }
}

#[async_trait]
impl HubApi for FakeHub {
    async fn fetch_chats_page(&self, query: &ChatsQuery) -> Result<ChatsPage, RemoteError> {
        if let Some(gate) = &self.gate {
            if !self.gate_passed.swap(true, AtomicOrdering::SeqCst) {
                gate.entered.notify_one();
                gate.release.notified().await;
            }
        }
        self.chat_queries.lock().unwrap().push(query.clone());
        let mut script = self.chats.lock().unwrap();
        (**script)(query)
    }

    async fn fetch_messages_page(
        &self,
        chat_id: &str,
        query: &MessagesQuery,
    ) -> Result<MessagesPage, RemoteError> {
        self.message_queries
            .lock()
            .unwrap()
            .push((chat_id.to_string(), query.clone()));
        if let Some(error) = self.message_failures.lock().unwrap().get(chat_id) {
            return Err(error());
        }
        let messages = self.messages.lock().unwrap();
        let history = messages.get(chat_id).map(Vec::as_slice).unwrap_or(&[]);
        Ok(message_page(history, query))
    }

    async fn fetch_chat(&self, chat_id: &str) -> Result<RawChat, RemoteError> {
        self.detail_requests.lock().unwrap().push(chat_id.to_string());
        self.chat_details
            .lock()
            .unwrap()
            .get(chat_id)
            .cloned()
            .ok_or(RemoteError::UnexpectedStatus {
                status: 404,
                body: "chat not found".into(),
            })
    }

    async fn send_message(
        &self,
        chat_id: &str,
        request: &SendRequest,
    ) -> Result<SendResult, RemoteError> {
        if let Some(error) = *self.send_failure.lock().unwrap() {
            return Err(error());
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((chat_id.to_string(), request.clone()));
        Ok(SendResult {
            chat_id: chat_id.to_string(),
            pending_message_id: format!("$sent-{}", sent.len()),
        })
    }

    async fn focus_chat(&self, chat_id: &str, draft_text: Option<&str>) -> Result<(), RemoteError> {
        self.focused
            .lock()
            .unwrap()
            .push((chat_id.to_string(), draft_text.map(str::to_string)));
        Ok(())
    }
}

pub(crate) fn test_db() -> SharedDb {
    shared(Database::open_in_memory().unwrap())
}

/// An engine over a fresh in-memory database.
pub(crate) fn engine_with(hub: FakeHub) -> (SyncEngine, Arc<FakeHub>) {
    let hub = Arc::new(hub);
    let engine = SyncEngine::new(test_db(), hub.clone(), EngineConfig::default());
    (engine, hub)
}
