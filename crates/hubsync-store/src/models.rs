//! Domain model structs persisted in the local SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the HTTP API layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hubsync_shared::types::{ChatType, MessageSide, MessageStatus};

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

/// A person independent of any chat network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub avatar_url: Option<String>,
    /// Instagram handle, lower-cased and without the leading `@`.
    pub instagram_username: Option<String>,
    /// Phone numbers as entered (WhatsApp and others).
    pub phones: Vec<String>,
    /// Normalized forms of `phones`, mirrored into `contact_phones`.
    pub normalized_phones: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for [`Database::insert_contact`](crate::Database::insert_contact).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewContact {
    pub name: String,
    pub avatar_url: Option<String>,
    pub instagram_username: Option<String>,
    #[serde(default)]
    pub phones: Vec<String>,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A conversation thread mirrored from the hub.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    /// Hub chat identifier. Immutable once created.
    pub chat_id: String,
    /// Hub-local room identifier.
    pub local_chat_id: Option<String>,
    pub account_id: String,
    pub network: String,
    pub title: String,
    pub chat_type: ChatType,

    // Counterpart summary, only meaningful for single chats.
    pub username: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub participant_name: Option<String>,
    pub avatar_url: Option<String>,
    pub cannot_message: bool,

    pub unread_count: i64,
    pub is_archived: bool,
    pub is_muted: bool,
    pub is_pinned: bool,
    pub last_activity: DateTime<Utc>,

    // Preview / reply tracking.
    pub last_message: Option<String>,
    pub last_message_from: Option<MessageSide>,
    pub needs_reply: bool,

    // Per-chat message window.
    pub newest_message_sort_key: Option<String>,
    pub oldest_message_sort_key: Option<String>,
    pub has_complete_history: bool,
    pub last_messages_synced_at: Option<DateTime<Utc>>,

    pub contact_id: Option<i64>,
    /// A user-chosen contact link; auto-matching never overrides it.
    pub contact_manually_linked: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A chat joined with its linked contact, as listed to the UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    #[serde(flatten)]
    pub chat: Chat,
    pub contact_name: Option<String>,
    pub contact_avatar_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A media descriptor attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// `img`, `video`, `audio`, `file`, ...
    pub kind: String,
    pub src_url: Option<String>,
    pub mime_type: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub is_voice_note: bool,
    pub is_sticker: bool,
}

/// An emoji reaction on a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub participant_id: String,
    pub reaction_key: String,
}

/// A single chat message. Immutable once stored by sync.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: String,
    pub chat_id: String,
    pub account_id: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Authoritative ordering token, compared with `compare_sort_keys`.
    pub sort_key: String,
    pub is_from_user: bool,
    pub attachments: Vec<Attachment>,
    pub reactions: Vec<Reaction>,
    pub status: MessageStatus,
    pub error_message: Option<String>,
}

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// A member of a chat, including the local user (`is_self`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub chat_id: String,
    pub participant_id: String,
    pub full_name: Option<String>,
    pub username: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub is_self: bool,
    pub cannot_message: bool,
    pub contact_id: Option<i64>,
}

// ---------------------------------------------------------------------------
// Sync bookkeeping
// ---------------------------------------------------------------------------

/// Pagination boundaries of the global chat list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CursorState {
    pub newest_cursor: Option<String>,
    pub oldest_cursor: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub source: Option<String>,
    pub total_chats: i64,
}

/// Current holder of the durable sync lock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncLock {
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
}

/// Durable state of the historical backfill job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackfillControl {
    pub running: bool,
    pub stop_requested: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub chats_processed: i64,
    pub messages_inserted: i64,
}
