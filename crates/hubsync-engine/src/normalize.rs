//! Mapping of hub wire records into the canonical shapes reconciled into
//! the store.
//!
//! Records the engine cannot key (no id, no sort key, no timestamp) are
//! dropped here with a debug log so one bad item never aborts a batch.

use chrono::{DateTime, SubsecRound, Utc};
use tracing::debug;

use hubsync_remote::{RawAttachment, RawChat, RawMessage, RawParticipant};
use hubsync_shared::normalize::{compare_sort_keys, extract_message_text, BotDenylist};
use hubsync_shared::types::{ChatType, MessageStatus};
use hubsync_store::{Attachment, Message, Participant, Reaction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedParticipant {
    pub participant_id: String,
    pub full_name: Option<String>,
    pub username: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub is_self: bool,
    pub cannot_message: bool,
}

impl NormalizedParticipant {
    pub fn to_participant(&self, chat_id: &str, contact_id: Option<i64>) -> Participant {
        Participant {
            chat_id: chat_id.to_string(),
            participant_id: self.participant_id.clone(),
            full_name: self.full_name.clone(),
            username: self.username.clone(),
            phone: self.phone.clone(),
            email: self.email.clone(),
            avatar_url: self.avatar_url.clone(),
            is_self: self.is_self,
            cannot_message: self.cannot_message,
            contact_id,
        }
    }

    /// Best human-readable label for this participant.
    pub fn display_name(&self) -> Option<&str> {
        self.full_name
            .as_deref()
            .or(self.username.as_deref())
            .or(self.phone.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedMessage {
    pub message_id: String,
    pub chat_id: String,
    pub account_id: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub sort_key: String,
    pub is_from_user: bool,
    pub attachments: Vec<Attachment>,
    pub reactions: Vec<Reaction>,
}

impl NormalizedMessage {
    pub fn to_message(&self) -> Message {
        Message {
            message_id: self.message_id.clone(),
            chat_id: self.chat_id.clone(),
            account_id: self.account_id.clone(),
            sender_id: self.sender_id.clone(),
            sender_name: self.sender_name.clone(),
            text: self.text.clone(),
            timestamp: self.timestamp,
            sort_key: self.sort_key.clone(),
            is_from_user: self.is_from_user,
            attachments: self.attachments.clone(),
            reactions: self.reactions.clone(),
            status: MessageStatus::Sent,
            error_message: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedChat {
    pub chat_id: String,
    pub local_chat_id: Option<String>,
    pub account_id: String,
    pub network: String,
    pub title: String,
    pub chat_type: ChatType,
    /// The other side of a single chat, bots excluded where possible.
    pub counterpart: Option<NormalizedParticipant>,
    pub participants: Vec<NormalizedParticipant>,
    /// The hub only embedded part of the participant list.
    pub participants_truncated: bool,
    pub unread_count: i64,
    pub is_archived: bool,
    pub is_muted: bool,
    pub is_pinned: bool,
    pub last_activity: DateTime<Utc>,
    pub preview: Option<NormalizedMessage>,
}

/// Parse an RFC 3339 timestamp, truncated to the millisecond precision the
/// store keeps so that re-applying a payload compares equal.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc).trunc_subsecs(3))
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Pick the counterpart of a single chat: the first non-self participant
/// that is not a bot, or the first non-self participant if all are bots.
pub fn resolve_counterpart<'a>(
    participants: &'a [NormalizedParticipant],
    bots: &BotDenylist,
) -> Option<&'a NormalizedParticipant> {
    let mut others = participants.iter().filter(|p| !p.is_self).peekable();
    let first = others.peek().copied();
    others
        .find(|p| !bots.is_bot(p.full_name.as_deref(), p.username.as_deref()))
        .or(first)
}

pub fn normalize_participant(raw: &RawParticipant) -> Option<NormalizedParticipant> {
    let Some(participant_id) = non_empty(raw.id.as_ref()) else {
        debug!("skipping participant without id");
        return None;
    };
    Some(NormalizedParticipant {
        participant_id,
        full_name: non_empty(raw.full_name.as_ref()),
        username: non_empty(raw.username.as_ref()),
        phone: non_empty(raw.phone_number.as_ref()),
        email: non_empty(raw.email.as_ref()),
        avatar_url: non_empty(raw.img_url.as_ref()),
        is_self: raw.is_self,
        cannot_message: raw.cannot_message,
    })
}

fn normalize_attachment(raw: &RawAttachment) -> Attachment {
    Attachment {
        kind: non_empty(raw.kind.as_ref()).unwrap_or_else(|| "unknown".into()),
        src_url: non_empty(raw.src_url.as_ref()),
        mime_type: non_empty(raw.mime_type.as_ref()),
        file_name: non_empty(raw.file_name.as_ref()),
        file_size: raw.file_size,
        is_voice_note: raw.is_voice_note,
        is_sticker: raw.is_sticker,
    }
}

/// Map one hub message. `chat_id` and `account_id` fill in when the hub
/// omits them on the item.
pub fn normalize_message(raw: &RawMessage, chat_id: &str, account_id: &str) -> Option<NormalizedMessage> {
    let Some(message_id) = non_empty(raw.id.as_ref()) else {
        debug!(chat_id, "skipping message without id");
        return None;
    };
    let Some(sort_key) = non_empty(raw.sort_key.as_ref()) else {
        debug!(chat_id, message_id, "skipping message without sort key");
        return None;
    };
    let Some(timestamp) = raw.timestamp.as_deref().and_then(parse_timestamp) else {
        debug!(chat_id, message_id, "skipping message without valid timestamp");
        return None;
    };

    let reactions = raw
        .reactions
        .iter()
        .filter_map(|r| {
            Some(Reaction {
                participant_id: non_empty(r.participant_id.as_ref())?,
                reaction_key: non_empty(r.reaction_key.as_ref())?,
            })
        })
        .collect();

    Some(NormalizedMessage {
        message_id,
        chat_id: non_empty(raw.chat_id.as_ref()).unwrap_or_else(|| chat_id.to_string()),
        account_id: non_empty(raw.account_id.as_ref()).unwrap_or_else(|| account_id.to_string()),
        sender_id: non_empty(raw.sender_id.as_ref()).unwrap_or_default(),
        sender_name: non_empty(raw.sender_name.as_ref()),
        text: extract_message_text(&raw.text),
        timestamp,
        sort_key,
        is_from_user: raw.is_sender.unwrap_or(false),
        attachments: raw.attachments.iter().map(normalize_attachment).collect(),
        reactions,
    })
}

/// Map a page of hub messages, sorted ascending by sort key.
pub fn normalize_messages(raw: &[RawMessage], chat_id: &str, account_id: &str) -> Vec<NormalizedMessage> {
    let mut messages: Vec<_> = raw
        .iter()
        .filter_map(|m| normalize_message(m, chat_id, account_id))
        .collect();
    messages.sort_by(|a, b| compare_sort_keys(&a.sort_key, &b.sort_key));
    messages
}

pub fn normalize_chat(raw: &RawChat, bots: &BotDenylist) -> Option<NormalizedChat> {
    let Some(chat_id) = non_empty(raw.id.as_ref()) else {
        debug!("skipping chat without id");
        return None;
    };

    let account_id = non_empty(raw.account_id.as_ref()).unwrap_or_default();
    let network = non_empty(raw.network.as_ref()).unwrap_or_else(|| account_id.clone());
    let chat_type = match raw.chat_type.as_deref().map(str::parse::<ChatType>) {
        Some(Ok(kind)) => kind,
        Some(Err(err)) => {
            debug!(chat_id, error = %err, "unknown chat type, assuming single");
            ChatType::Single
        }
        None => ChatType::Single,
    };

    let (participants, participants_truncated) = match &raw.participants {
        Some(list) => (
            list.items.iter().filter_map(normalize_participant).collect::<Vec<_>>(),
            list.has_more,
        ),
        None => (Vec::new(), false),
    };
    let counterpart = match chat_type {
        ChatType::Single => resolve_counterpart(&participants, bots).cloned(),
        ChatType::Group => None,
    };

    let preview = raw
        .preview
        .as_deref()
        .and_then(|m| normalize_message(m, &chat_id, &account_id));
    let last_activity = raw
        .last_activity
        .as_deref()
        .and_then(parse_timestamp)
        .or_else(|| preview.as_ref().map(|m| m.timestamp))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let title = non_empty(raw.title.as_ref())
        .or_else(|| counterpart.as_ref().and_then(|p| p.display_name()).map(str::to_string))
        .unwrap_or_else(|| chat_id.clone());

    Some(NormalizedChat {
        chat_id,
        local_chat_id: non_empty(raw.local_chat_id.as_ref()),
        account_id,
        network,
        title,
        chat_type,
        counterpart,
        participants,
        participants_truncated,
        unread_count: raw.unread_count.unwrap_or(0).max(0),
        is_archived: raw.is_archived.unwrap_or(false),
        is_muted: raw.is_muted.unwrap_or(false),
        is_pinned: raw.is_pinned.unwrap_or(false),
        last_activity,
        preview,
    })
}
