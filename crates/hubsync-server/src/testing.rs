//! A canned hub and engine wiring for daemon tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use hubsync_engine::{shared, EngineConfig, SyncEngine};
use hubsync_remote::{
    ChatsPage, ChatsQuery, HubApi, MessagesPage, MessagesQuery, RawChat, RawMessage,
    RawParticipant, RawParticipantList, RemoteError, RetryPolicy, SendRequest, SendResult,
};
use hubsync_store::Database;

pub(crate) fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

fn participant(id: &str, name: &str, is_self: bool) -> RawParticipant {
    RawParticipant {
        id: Some(id.into()),
        full_name: Some(name.into()),
        is_self,
        ..Default::default()
    }
}

fn message(chat_id: &str, n: u32) -> RawMessage {
    RawMessage {
        id: Some(format!("{chat_id}-m{n}")),
        sender_id: Some("@bob".into()),
        sender_name: Some("Bob".into()),
        timestamp: Some(format!("2024-05-01T12:00:0{n}.000Z")),
        sort_key: Some(n.to_string()),
        text: json!(format!("hello {n}")),
        is_sender: Some(false),
        ..Default::default()
    }
}

/// One single chat with Bob and three messages.
pub(crate) struct StubHub {
    chat: RawChat,
    messages: Vec<RawMessage>,
    chat_failures: Mutex<VecDeque<RemoteError>>,
    chat_calls: AtomicUsize,
    message_calls: AtomicUsize,
    sent: AtomicUsize,
}

impl StubHub {
    pub(crate) fn with_chat(chat_id: &str) -> Self {
        let messages: Vec<_> = (1..=3).map(|n| message(chat_id, n)).collect();
        let chat = RawChat {
            id: Some(chat_id.into()),
            account_id: Some("telegram".into()),
            network: Some("Telegram".into()),
            title: Some("Bob".into()),
            chat_type: Some("single".into()),
            participants: Some(RawParticipantList {
                items: vec![participant("@me", "Me", true), participant("@bob", "Bob", false)],
                has_more: false,
                total: Some(2),
            }),
            last_activity: Some("2024-05-01T12:00:03.000Z".into()),
            unread_count: Some(1),
            preview: messages.last().cloned().map(Box::new),
            ..Default::default()
        };
        Self {
            chat,
            messages,
            chat_failures: Mutex::new(VecDeque::new()),
            chat_calls: AtomicUsize::new(0),
            message_calls: AtomicUsize::new(0),
            sent: AtomicUsize::new(0),
        }
    }

    /// Fail the next chat-list requests with `errors`, in order.
    pub(crate) fn fail_chats_with(&self, errors: Vec<RemoteError>) {
        self.chat_failures.lock().unwrap().extend(errors);
    }

    pub(crate) fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn message_calls(&self) -> usize {
        self.message_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HubApi for StubHub {
    async fn fetch_chats_page(&self, _query: &ChatsQuery) -> Result<ChatsPage, RemoteError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.chat_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(ChatsPage {
            items: vec![self.chat.clone()],
            newest_cursor: Some("n1".into()),
            oldest_cursor: Some("o1".into()),
            has_more: false,
        })
    }

    async fn fetch_messages_page(
        &self,
        _chat_id: &str,
        _query: &MessagesQuery,
    ) -> Result<MessagesPage, RemoteError> {
        self.message_calls.fetch_add(1, Ordering::SeqCst);
        Ok(MessagesPage {
            items: self.messages.iter().rev().cloned().collect(),
            has_more: false,
        })
    }

    async fn fetch_chat(&self, chat_id: &str) -> Result<RawChat, RemoteError> {
        if self.chat.id.as_deref() == Some(chat_id) {
            Ok(self.chat.clone())
        } else {
            Err(RemoteError::UnexpectedStatus {
                status: 404,
                body: "no such chat".into(),
            })
        }
    }

    async fn send_message(&self, chat_id: &str, _request: &SendRequest) -> Result<SendResult, RemoteError> {
        let n = self.sent.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SendResult {
            chat_id: chat_id.to_string(),
            pending_message_id: format!("{chat_id}-sent{n}"),
        })
    }

    async fn focus_chat(&self, _chat_id: &str, _draft_text: Option<&str>) -> Result<(), RemoteError> {
        Ok(())
    }
}

pub(crate) fn test_engine(hub: Arc<StubHub>) -> SyncEngine {
    let db = shared(Database::open_in_memory().unwrap());
    SyncEngine::new(db, hub, EngineConfig::default())
}
