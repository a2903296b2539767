//! Optimistic outgoing messages.
//!
//! A message is stored under a synthetic `local-` id before the hub sees
//! it, then renamed to the id the hub assigns. If sync already stored the
//! hub's copy, the local row is dropped instead.

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use hubsync_remote::SendRequest;
use hubsync_shared::constants::LOCAL_MESSAGE_PREFIX;
use hubsync_shared::types::MessageStatus;
use hubsync_store::{Database, Message};

use crate::error::{Result, SyncError};
use crate::lock_db;
use crate::reconcile::insert_local_message;
use crate::sync::SyncEngine;

/// A sort key placing a new local message right after `newest`.
fn next_local_sort_key(newest: Option<&str>, now: DateTime<Utc>) -> String {
    match newest {
        Some(key) => match key.trim().parse::<i128>() {
            Ok(n) => (n + 1).to_string(),
            Err(_) => format!("{key}~"),
        },
        None => now.timestamp_millis().to_string(),
    }
}

/// The local user's participant id and name in `chat_id`.
fn self_sender(db: &Database, chat_id: &str) -> Result<(String, Option<String>)> {
    let me = db.list_participants(chat_id)?.into_iter().find(|p| p.is_self);
    Ok(match me {
        Some(p) => (p.participant_id, p.full_name),
        None => ("self".to_string(), None),
    })
}

impl SyncEngine {
    /// Store `text` as a pending message, send it through the hub and
    /// settle it. A hub failure is recorded on the returned message
    /// (`status = failed`), not returned as an error.
    pub async fn send_message(&self, chat_id: &str, text: &str, reply_to: Option<&str>) -> Result<Message> {
        if text.trim().is_empty() {
            return Err(SyncError::Invalid("message text is empty".into()));
        }

        let local = {
            let db = lock_db(self.db())?;
            let chat = db.get_chat(chat_id).map_err(SyncError::chat_lookup(chat_id))?;
            let now = Utc::now().trunc_subsecs(3);
            let (sender_id, sender_name) = self_sender(&db, chat_id)?;
            let newest = match chat.newest_message_sort_key {
                Some(key) => Some(key),
                None => db.latest_message_for_chat(chat_id)?.map(|m| m.sort_key),
            };
            let message = Message {
                message_id: format!("{LOCAL_MESSAGE_PREFIX}{}", Uuid::new_v4()),
                chat_id: chat_id.to_string(),
                account_id: chat.account_id,
                sender_id,
                sender_name,
                text: text.to_string(),
                timestamp: now,
                sort_key: next_local_sort_key(newest.as_deref(), now),
                is_from_user: true,
                attachments: Vec::new(),
                reactions: Vec::new(),
                status: MessageStatus::Sending,
                error_message: None,
            };
            insert_local_message(&db, &message, now)?;
            message
        };

        let request = SendRequest {
            text: text.to_string(),
            reply_to_message_id: reply_to.map(str::to_string),
        };
        self.deliver(local, &request).await
    }

    /// Send a failed message again. The reply reference is not kept.
    pub async fn retry_message(&self, message_id: &str) -> Result<Message> {
        let message = {
            let db = lock_db(self.db())?;
            let message = db
                .find_message(message_id)?
                .ok_or_else(|| SyncError::MessageNotFound(message_id.to_string()))?;
            if message.status != MessageStatus::Failed {
                return Err(SyncError::NotRetryable(message_id.to_string()));
            }
            db.set_message_status(message_id, MessageStatus::Sending, None)?;
            Message {
                status: MessageStatus::Sending,
                error_message: None,
                ..message
            }
        };

        let request = SendRequest {
            text: message.text.clone(),
            reply_to_message_id: None,
        };
        self.deliver(message, &request).await
    }

    async fn deliver(&self, local: Message, request: &SendRequest) -> Result<Message> {
        let sent = match self.hub().send_message(&local.chat_id, request).await {
            Ok(sent) => sent,
            Err(err) => {
                warn!(chat_id = %local.chat_id, message_id = %local.message_id, error = %err, "send failed");
                let reason = err.to_string();
                let db = lock_db(self.db())?;
                db.set_message_status(&local.message_id, MessageStatus::Failed, Some(&reason))?;
                return Ok(Message {
                    status: MessageStatus::Failed,
                    error_message: Some(reason),
                    ..local
                });
            }
        };

        let hub_id = sent.pending_message_id;
        let db = lock_db(self.db())?;
        db.in_transaction(|db| -> hubsync_store::Result<()> {
            if db.message_exists(&hub_id)? {
                db.delete_message(&local.message_id)?;
            } else {
                db.rename_message(&local.message_id, &hub_id)?;
                db.set_message_status(&hub_id, MessageStatus::Sent, None)?;
            }
            Ok(())
        })?;
        info!(chat_id = %local.chat_id, local_id = %local.message_id, message_id = %hub_id, "message sent");

        db.find_message(&hub_id)?
            .ok_or(SyncError::MessageNotFound(hub_id))
    }

    /// Bring a chat to the foreground of the hub's desktop app.
    pub async fn focus_chat(&self, chat_id: &str, draft_text: Option<&str>) -> Result<()> {
        self.hub().focus_chat(chat_id, draft_text).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hubsync_remote::RemoteError;
    use hubsync_shared::normalize::{BotDenylist, PhoneRules};

    use super::*;
    use crate::reconcile::{upsert_chat, upsert_messages, upsert_participants};
    use crate::testing::{engine_with, normalized_chat, normalized_message, t0, FakeHub};

    fn hub_down() -> RemoteError {
        RemoteError::Server {
            status: 500,
            body: "send failed upstream".into(),
        }
    }

    fn seeded_engine() -> (SyncEngine, std::sync::Arc<FakeHub>) {
        let (engine, hub) = engine_with(FakeHub::new());
        {
            let db = engine.db().lock().unwrap();
            let rules = PhoneRules::default();
            let chat = normalized_chat("!a", 5);
            upsert_chat(&db, &chat, &rules, t0()).unwrap();
            upsert_participants(&db, "!a", &chat.participants, &BotDenylist::default(), &rules, t0()).unwrap();
            let batch: Vec<_> = (1..=3)
                .map(|i| normalized_message("!a", &format!("${i}"), &i.to_string(), false))
                .collect();
            upsert_messages(&db, "!a", &batch, t0()).unwrap();
        }
        (engine, hub)
    }

    #[test]
    fn local_sort_keys_follow_the_newest() {
        assert_eq!(next_local_sort_key(Some("41"), t0()), "42");
        assert_eq!(next_local_sort_key(Some("abc"), t0()), "abc~");
        assert_eq!(next_local_sort_key(None, t0()), t0().timestamp_millis().to_string());
    }

    #[tokio::test]
    async fn sent_message_takes_the_hub_id() {
        let (engine, hub) = seeded_engine();

        let message = engine.send_message("!a", "hello", Some("$2")).await.unwrap();
        assert_eq!(message.message_id, "$sent-1");
        assert_eq!(message.status, MessageStatus::Sent);
        assert_eq!(message.sort_key, "4");
        assert_eq!(message.sender_id, "@me");

        let (chat_id, request) = hub.sent.lock().unwrap()[0].clone();
        assert_eq!(chat_id, "!a");
        assert_eq!(request.reply_to_message_id.as_deref(), Some("$2"));

        let db = engine.db().lock().unwrap();
        assert_eq!(db.count_messages_for_chat("!a").unwrap(), 4);
        let chat = db.get_chat("!a").unwrap();
        assert_eq!(chat.last_message.as_deref(), Some("hello"));
        assert!(!chat.needs_reply);
    }

    #[tokio::test]
    async fn synced_copy_replaces_the_local_row() {
        let (engine, _hub) = seeded_engine();
        {
            let db = engine.db().lock().unwrap();
            upsert_messages(&db, "!a", &[normalized_message("!a", "$sent-1", "4", true)], t0()).unwrap();
        }

        let message = engine.send_message("!a", "hello", None).await.unwrap();
        assert_eq!(message.message_id, "$sent-1");
        assert_eq!(message.text, "message $sent-1");
        assert_eq!(engine.db().lock().unwrap().count_messages_for_chat("!a").unwrap(), 4);
    }

    #[tokio::test]
    async fn failed_send_is_stored_and_retryable() {
        let (engine, hub) = seeded_engine();
        hub.set_send_failure(Some(hub_down));

        let failed = engine.send_message("!a", "hello", Some("$1")).await.unwrap();
        assert_eq!(failed.status, MessageStatus::Failed);
        assert!(failed.message_id.starts_with(LOCAL_MESSAGE_PREFIX));
        assert!(failed.error_message.as_deref().unwrap().contains("send failed upstream"));

        let stored = engine.db().lock().unwrap().find_message(&failed.message_id).unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Failed);

        hub.set_send_failure(None);
        let retried = engine.retry_message(&failed.message_id).await.unwrap();
        assert_eq!(retried.status, MessageStatus::Sent);
        assert_eq!(retried.message_id, "$sent-1");
        assert_eq!(hub.sent.lock().unwrap()[0].1.reply_to_message_id, None);

        assert!(matches!(
            engine.retry_message("$sent-1").await,
            Err(SyncError::NotRetryable(_))
        ));
        assert!(matches!(
            engine.retry_message("$missing").await,
            Err(SyncError::MessageNotFound(_))
        ));
    }

    #[tokio::test]
    async fn rejects_empty_text_and_unknown_chats() {
        let (engine, hub) = seeded_engine();
        assert!(matches!(
            engine.send_message("!a", "   ", None).await,
            Err(SyncError::Invalid(_))
        ));
        assert!(matches!(
            engine.send_message("!nope", "hi", None).await,
            Err(SyncError::ChatNotFound(_))
        ));
        assert!(hub.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn focus_is_forwarded() {
        let (engine, hub) = seeded_engine();
        engine.focus_chat("!a", Some("draft")).await.unwrap();
        assert_eq!(
            hub.focused.lock().unwrap().as_slice(),
            [("!a".to_string(), Some("draft".to_string()))]
        );
    }
}
