use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use hubsync_shared::normalize::{is_name_improvement, is_sort_key_older, pick_display_name, PhoneRules};
use hubsync_shared::types::MessageSide;
use hubsync_store::{Chat, Database, Result};

use super::contacts::resolve_contact;
use crate::normalize::NormalizedChat;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatUpsertOutcome {
    pub inserted: bool,
    /// Stored metadata changed. `false` means no write happened.
    pub updated: bool,
    /// Newer messages exist on the hub than in the cache.
    pub needs_message_sync: bool,
}

/// Insert or update one chat.
///
/// An existing row is only rewritten when a tracked field changed. Preview
/// fields are never taken from a payload whose activity is older than the
/// stored one.
pub fn upsert_chat(
    db: &Database,
    incoming: &NormalizedChat,
    rules: &PhoneRules,
    now: DateTime<Utc>,
) -> Result<ChatUpsertOutcome> {
    db.in_transaction(|db| {
        let counterpart = incoming.counterpart.as_ref();
        let username = counterpart.and_then(|p| p.username.as_deref());
        let phone = counterpart.and_then(|p| p.phone.as_deref());

        let Some(stored) = db.find_chat(&incoming.chat_id)? else {
            let contact_id = resolve_contact(db, username, phone, rules)?;
            db.insert_chat(&new_chat(incoming, contact_id, now))?;
            debug!(chat_id = %incoming.chat_id, "chat inserted");
            return Ok(ChatUpsertOutcome {
                inserted: true,
                updated: false,
                needs_message_sync: true,
            });
        };

        let needs_message_sync = needs_message_sync(&stored, incoming);

        let contact_id = if stored.contact_manually_linked {
            stored.contact_id
        } else {
            resolve_contact(db, username, phone, rules)?.or(stored.contact_id)
        };

        let mut next = stored.clone();
        let mut changed = false;

        if incoming.last_activity > stored.last_activity {
            next.last_activity = incoming.last_activity;
            changed = true;
        }
        if incoming.unread_count != stored.unread_count {
            next.unread_count = incoming.unread_count;
            changed = true;
        }
        if contact_id != stored.contact_id {
            next.contact_id = contact_id;
            changed = true;
        }
        if let Some(username) = username {
            if stored.username.as_deref() != Some(username) {
                next.username = Some(username.to_string());
                changed = true;
            }
        }
        if let Some(phone) = phone {
            if stored.phone.as_deref() != Some(phone) {
                next.phone = Some(phone.to_string());
                changed = true;
            }
        }
        if (incoming.is_archived, incoming.is_muted, incoming.is_pinned)
            != (stored.is_archived, stored.is_muted, stored.is_pinned)
        {
            next.is_archived = incoming.is_archived;
            next.is_muted = incoming.is_muted;
            next.is_pinned = incoming.is_pinned;
            changed = true;
        }
        if is_name_improvement(Some(stored.title.as_str()), Some(incoming.title.as_str())) {
            next.title = incoming.title.clone();
            changed = true;
        }
        let participant_name = counterpart.and_then(|p| p.full_name.as_deref());
        let picked = pick_display_name(stored.participant_name.as_deref(), participant_name);
        if picked != stored.participant_name {
            next.participant_name = picked;
            changed = true;
        }

        if incoming.last_activity >= stored.last_activity {
            if let Some(preview) = &incoming.preview {
                let side = MessageSide::from_is_sender(preview.is_from_user);
                if stored.last_message.as_deref() != Some(preview.text.as_str())
                    || stored.last_message_from != Some(side)
                {
                    next.last_message = Some(preview.text.clone());
                    next.last_message_from = Some(side);
                    next.needs_reply = !preview.is_from_user;
                    changed = true;
                }
            }
        }

        if !changed {
            return Ok(ChatUpsertOutcome {
                inserted: false,
                updated: false,
                needs_message_sync,
            });
        }

        // Untracked descriptive fields ride along with a real change.
        next.local_chat_id = incoming.local_chat_id.clone().or(next.local_chat_id);
        next.network = incoming.network.clone();
        if let Some(p) = counterpart {
            next.email = p.email.clone().or(next.email);
            next.avatar_url = p.avatar_url.clone().or(next.avatar_url);
            next.cannot_message = p.cannot_message;
        }
        next.updated_at = now;
        db.update_chat(&next)?;
        debug!(chat_id = %incoming.chat_id, "chat updated");

        Ok(ChatUpsertOutcome {
            inserted: false,
            updated: true,
            needs_message_sync,
        })
    })
}

/// Compare the hub's newest message against what the cache holds. Without
/// a preview sort key, fall back to activity time versus the last message
/// refresh.
fn needs_message_sync(stored: &Chat, incoming: &NormalizedChat) -> bool {
    match (&incoming.preview, &stored.newest_message_sort_key) {
        (Some(preview), Some(newest)) => is_sort_key_older(newest, &preview.sort_key),
        (Some(_), None) => true,
        (None, _) => match stored.last_messages_synced_at {
            Some(synced) => incoming.last_activity > synced,
            None => true,
        },
    }
}

fn new_chat(incoming: &NormalizedChat, contact_id: Option<i64>, now: DateTime<Utc>) -> Chat {
    let counterpart = incoming.counterpart.as_ref();
    let preview = incoming.preview.as_ref();
    Chat {
        chat_id: incoming.chat_id.clone(),
        local_chat_id: incoming.local_chat_id.clone(),
        account_id: incoming.account_id.clone(),
        network: incoming.network.clone(),
        title: incoming.title.clone(),
        chat_type: incoming.chat_type,
        username: counterpart.and_then(|p| p.username.clone()),
        phone: counterpart.and_then(|p| p.phone.clone()),
        email: counterpart.and_then(|p| p.email.clone()),
        participant_name: counterpart.and_then(|p| p.full_name.clone()),
        avatar_url: counterpart.and_then(|p| p.avatar_url.clone()),
        cannot_message: counterpart.map_or(false, |p| p.cannot_message),
        unread_count: incoming.unread_count,
        is_archived: incoming.is_archived,
        is_muted: incoming.is_muted,
        is_pinned: incoming.is_pinned,
        last_activity: incoming.last_activity,
        last_message: preview.map(|m| m.text.clone()),
        last_message_from: preview.map(|m| MessageSide::from_is_sender(m.is_from_user)),
        needs_reply: preview.map_or(false, |m| !m.is_from_user),
        newest_message_sort_key: None,
        oldest_message_sort_key: None,
        has_complete_history: false,
        last_messages_synced_at: None,
        contact_id,
        contact_manually_linked: false,
        created_at: now,
        updated_at: now,
    }
}
