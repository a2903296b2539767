//! Read-side queries served to the UI from the local cache.

use serde::{Deserialize, Serialize};

use hubsync_shared::types::ChatFilter;
use hubsync_store::{Chat, ChatSummary, Database, Message, Participant};

use crate::error::{Result, SyncError};

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 200;

fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatListQuery {
    pub filter: ChatFilter,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageListQuery {
    pub limit: Option<u32>,
    /// Only messages strictly older than this sort key.
    #[serde(alias = "before")]
    pub before_sort_key: Option<String>,
}

/// A chat with its participant list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDetail {
    #[serde(flatten)]
    pub chat: Chat,
    pub participants: Vec<Participant>,
}

/// Chats by most recent activity, with their linked contact's name and
/// avatar.
pub fn list_chats(db: &Database, query: &ChatListQuery) -> Result<Vec<ChatSummary>> {
    Ok(db.list_chat_summaries(query.filter, clamp_limit(query.limit), query.offset.unwrap_or(0))?)
}

/// One page of a chat's messages in display order (oldest first).
pub fn list_messages(db: &Database, chat_id: &str, query: &MessageListQuery) -> Result<Vec<Message>> {
    if db.find_chat(chat_id)?.is_none() {
        return Err(SyncError::ChatNotFound(chat_id.to_string()));
    }
    let mut messages =
        db.list_messages_for_chat(chat_id, clamp_limit(query.limit), query.before_sort_key.as_deref())?;
    messages.reverse();
    Ok(messages)
}

pub fn get_chat(db: &Database, chat_id: &str) -> Result<ChatDetail> {
    let chat = db.get_chat(chat_id).map_err(SyncError::chat_lookup(chat_id))?;
    let participants = db.list_participants(chat_id)?;
    Ok(ChatDetail { chat, participants })
}

/// Link a chat to a contact by hand, or unlink it with `None`. Manual
/// links are never overwritten by automatic matching.
pub fn link_chat_contact(db: &Database, chat_id: &str, contact_id: Option<i64>) -> Result<ChatDetail> {
    if let Some(id) = contact_id {
        if !db.contact_exists(id)? {
            return Err(SyncError::Invalid(format!("unknown contact {id}")));
        }
    }
    if !db.set_chat_contact(chat_id, contact_id, true)? {
        return Err(SyncError::ChatNotFound(chat_id.to_string()));
    }
    get_chat(db, chat_id)
}
