use chrono::{DateTime, Utc};
use tracing::debug;

use hubsync_shared::normalize::{compare_sort_keys, is_sort_key_older};
use hubsync_shared::types::MessageSide;
use hubsync_store::{Chat, Database, Message, Result};

use crate::normalize::NormalizedMessage;

/// Insert the messages of one page and refresh the chat's reply tracking.
///
/// Messages already stored are skipped, never patched. Returns the number
/// of rows inserted.
pub fn upsert_messages(
    db: &Database,
    chat_id: &str,
    batch: &[NormalizedMessage],
    now: DateTime<Utc>,
) -> Result<usize> {
    db.in_transaction(|db| {
        let mut chat = db.get_chat(chat_id)?;

        let mut ordered: Vec<&NormalizedMessage> = batch.iter().collect();
        ordered.sort_by(|a, b| compare_sort_keys(&a.sort_key, &b.sort_key));

        let mut inserted = 0;
        for message in &ordered {
            if db.message_exists(&message.message_id)? {
                continue;
            }
            db.insert_message(&message.to_message())?;
            inserted += 1;
        }

        match ordered.last() {
            Some(last) => apply_latest(&mut chat, &last.text, last.is_from_user, &last.sort_key),
            None => {
                if let Some(latest) = db.latest_message_for_chat(chat_id)? {
                    apply_latest(&mut chat, &latest.text, latest.is_from_user, &latest.sort_key);
                }
            }
        }

        if let Some(first) = ordered.first() {
            let extends = chat
                .oldest_message_sort_key
                .as_deref()
                .map_or(true, |oldest| is_sort_key_older(&first.sort_key, oldest));
            if extends {
                chat.oldest_message_sort_key = Some(first.sort_key.clone());
            }
        }

        chat.last_messages_synced_at = Some(now);
        chat.updated_at = now;
        db.update_chat(&chat)?;

        debug!(chat_id, received = batch.len(), inserted, "message batch reconciled");
        Ok(inserted)
    })
}

/// Take reply tracking from `sort_key`'s message unless the chat already
/// knows a newer one.
fn apply_latest(chat: &mut Chat, text: &str, is_from_user: bool, sort_key: &str) {
    let stale = chat
        .newest_message_sort_key
        .as_deref()
        .map_or(false, |newest| is_sort_key_older(sort_key, newest));
    if stale {
        return;
    }
    chat.last_message = Some(text.to_string());
    chat.last_message_from = Some(MessageSide::from_is_sender(is_from_user));
    chat.needs_reply = !is_from_user;
    chat.newest_message_sort_key = Some(sort_key.to_string());
}

/// Store an optimistic outgoing message and make it the chat's preview.
pub fn insert_local_message(db: &Database, message: &Message, now: DateTime<Utc>) -> Result<()> {
    db.in_transaction(|db| {
        let mut chat = db.get_chat(&message.chat_id)?;
        db.insert_message(message)?;
        apply_latest(&mut chat, &message.text, true, &message.sort_key);
        chat.last_activity = chat.last_activity.max(message.timestamp);
        chat.updated_at = now;
        db.update_chat(&chat)
    })
}

/// Record that backward pagination reached the start of the chat.
pub fn mark_history_complete(db: &Database, chat_id: &str, now: DateTime<Utc>) -> Result<()> {
    db.in_transaction(|db| {
        let mut chat = db.get_chat(chat_id)?;
        if chat.has_complete_history {
            return Ok(());
        }
        chat.has_complete_history = true;
        chat.updated_at = now;
        db.update_chat(&chat)
    })
}

#[cfg(test)]
mod tests {
    use hubsync_shared::normalize::PhoneRules;
    use hubsync_shared::types::MessageStatus;

    use super::*;
    use crate::reconcile::upsert_chat;
    use crate::testing::{normalized_chat, normalized_message, t0};

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        upsert_chat(&db, &normalized_chat("!a", 0), &PhoneRules::default(), t0()).unwrap();
        db
    }

    #[test]
    fn stored_messages_are_never_patched() {
        let db = setup();
        let original = normalized_message("!a", "$1", "1", false);
        assert_eq!(upsert_messages(&db, "!a", &[original.clone()], t0()).unwrap(), 1);

        let mut edited = original.clone();
        edited.text = "edited upstream".into();
        assert_eq!(upsert_messages(&db, "!a", &[edited], t0()).unwrap(), 0);

        let stored = db.find_message("$1").unwrap().unwrap();
        assert_eq!(stored.text, original.text);
        assert_eq!(db.count_messages_for_chat("!a").unwrap(), 1);
    }

    #[test]
    fn preview_comes_from_the_newest_message_in_the_batch() {
        let db = setup();
        // Deliberately out of order.
        let batch = vec![
            normalized_message("!a", "$10", "10", false),
            normalized_message("!a", "$5", "5", true),
        ];
        assert_eq!(upsert_messages(&db, "!a", &batch, t0()).unwrap(), 2);

        let chat = db.get_chat("!a").unwrap();
        assert_eq!(chat.last_message.as_deref(), Some("message $10"));
        assert_eq!(chat.last_message_from, Some(MessageSide::Them));
        assert!(chat.needs_reply);
        assert_eq!(chat.newest_message_sort_key.as_deref(), Some("10"));
        assert_eq!(chat.oldest_message_sort_key.as_deref(), Some("5"));
        assert_eq!(chat.last_messages_synced_at, Some(t0()));
    }

    #[test]
    fn historical_batch_keeps_the_live_preview() {
        let db = setup();
        upsert_messages(&db, "!a", &[normalized_message("!a", "$100", "100", true)], t0()).unwrap();
        let before = db.get_chat("!a").unwrap();

        let history = vec![
            normalized_message("!a", "$40", "40", false),
            normalized_message("!a", "$50", "50", false),
        ];
        assert_eq!(upsert_messages(&db, "!a", &history, t0()).unwrap(), 2);

        let after = db.get_chat("!a").unwrap();
        assert_eq!(after.last_message, before.last_message);
        assert_eq!(after.needs_reply, before.needs_reply);
        assert_eq!(after.newest_message_sort_key.as_deref(), Some("100"));
        assert_eq!(after.oldest_message_sort_key.as_deref(), Some("40"));
    }

    #[test]
    fn empty_batch_recomputes_from_storage() {
        let db = setup();
        upsert_messages(&db, "!a", &[normalized_message("!a", "$7", "7", false)], t0()).unwrap();
        let mut chat = db.get_chat("!a").unwrap();
        chat.last_message = None;
        chat.needs_reply = false;
        chat.newest_message_sort_key = None;
        db.update_chat(&chat).unwrap();

        assert_eq!(upsert_messages(&db, "!a", &[], t0()).unwrap(), 0);
        let chat = db.get_chat("!a").unwrap();
        assert_eq!(chat.last_message.as_deref(), Some("message $7"));
        assert!(chat.needs_reply);
    }

    #[test]
    fn local_message_becomes_preview() {
        let db = setup();
        let mut local = normalized_message("!a", "local-1", "11", true).to_message();
        local.status = MessageStatus::Sending;
        insert_local_message(&db, &local, t0()).unwrap();

        let chat = db.get_chat("!a").unwrap();
        assert_eq!(chat.last_message_from, Some(MessageSide::User));
        assert!(!chat.needs_reply);
        assert_eq!(chat.newest_message_sort_key.as_deref(), Some("11"));

        mark_history_complete(&db, "!a", t0()).unwrap();
        assert!(db.get_chat("!a").unwrap().has_complete_history);
    }

    #[test]
    fn unknown_chat_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        assert!(upsert_messages(&db, "!missing", &[], t0()).is_err());
    }
}
