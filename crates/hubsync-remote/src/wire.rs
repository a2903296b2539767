//! Wire shapes of hub responses.
//!
//! Every field the hub may omit is optional here; the engine's normalizer
//! decides which omissions skip a record and which get a fallback.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawChat {
    pub id: Option<String>,
    #[serde(rename = "localChatID")]
    pub local_chat_id: Option<String>,
    #[serde(rename = "accountID")]
    pub account_id: Option<String>,
    pub network: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub chat_type: Option<String>,
    pub participants: Option<RawParticipantList>,
    /// RFC 3339 timestamp.
    pub last_activity: Option<String>,
    pub unread_count: Option<i64>,
    pub is_archived: Option<bool>,
    pub is_muted: Option<bool>,
    pub is_pinned: Option<bool>,
    /// Most recent message, when the hub includes it in the summary.
    pub preview: Option<Box<RawMessage>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawParticipantList {
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<RawParticipant>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub has_more: bool,
    pub total: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawParticipant {
    pub id: Option<String>,
    pub full_name: Option<String>,
    pub username: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "imgURL")]
    pub img_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_self: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cannot_message: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    pub id: Option<String>,
    #[serde(rename = "chatID")]
    pub chat_id: Option<String>,
    #[serde(rename = "accountID")]
    pub account_id: Option<String>,
    #[serde(rename = "senderID")]
    pub sender_id: Option<String>,
    pub sender_name: Option<String>,
    /// RFC 3339 timestamp.
    pub timestamp: Option<String>,
    /// Numeric or lexical ordering token; numbers are kept as their decimal
    /// string.
    #[serde(default, deserialize_with = "string_or_number")]
    pub sort_key: Option<String>,
    /// Either a plain string or a structured/serialized object.
    #[serde(default)]
    pub text: Value,
    pub is_sender: Option<bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attachments: Vec<RawAttachment>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reactions: Vec<RawReaction>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawAttachment {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(rename = "srcURL")]
    pub src_url: Option<String>,
    pub mime_type: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_voice_note: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_sticker: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawReaction {
    pub id: Option<String>,
    #[serde(rename = "participantID")]
    pub participant_id: Option<String>,
    pub reaction_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatsPage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<RawChat>,
    pub newest_cursor: Option<String>,
    pub oldest_cursor: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub has_more: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessagesPage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<RawMessage>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendResult {
    #[serde(rename = "chatID")]
    pub chat_id: String,
    #[serde(rename = "pendingMessageID")]
    pub pending_message_id: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Treat an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_accepts_numeric_and_string_sort_keys() {
        let numeric: RawMessage = serde_json::from_value(json!({
            "id": "$1", "sortKey": 1718035200000u64, "text": "hi"
        }))
        .unwrap();
        assert_eq!(numeric.sort_key.as_deref(), Some("1718035200000"));

        let lexical: RawMessage =
            serde_json::from_value(json!({ "id": "$2", "sortKey": "a1b2" })).unwrap();
        assert_eq!(lexical.sort_key.as_deref(), Some("a1b2"));
        assert_eq!(lexical.text, Value::Null);

        let odd: RawMessage =
            serde_json::from_value(json!({ "id": "$3", "sortKey": [1] })).unwrap();
        assert_eq!(odd.sort_key, None);
    }

    #[test]
    fn chat_page_uses_hub_field_names() {
        let page: ChatsPage = serde_json::from_value(json!({
            "items": [{
                "id": "!abc:hub",
                "localChatID": "42",
                "accountID": "whatsapp",
                "network": "WhatsApp",
                "title": "Alice",
                "type": "single",
                "participants": {
                    "items": [{ "id": "@alice", "fullName": "Alice", "phoneNumber": "+66812345678" }],
                    "hasMore": false,
                    "total": 1
                },
                "lastActivity": "2024-05-01T12:00:00.000Z",
                "unreadCount": 2,
                "isArchived": false
            }],
            "newestCursor": "n1",
            "oldestCursor": "o1",
            "hasMore": true
        }))
        .unwrap();

        assert!(page.has_more);
        let chat = &page.items[0];
        assert_eq!(chat.local_chat_id.as_deref(), Some("42"));
        assert_eq!(chat.chat_type.as_deref(), Some("single"));
        let participants = chat.participants.as_ref().unwrap();
        assert_eq!(participants.items[0].phone_number.as_deref(), Some("+66812345678"));
        assert!(!participants.items[0].is_self);
    }

    #[test]
    fn null_collections_and_flags_fall_back_to_defaults() {
        let page: MessagesPage = serde_json::from_value(json!({
            "items": [
                { "id": "$1", "sortKey": "1", "text": "ok" },
                {
                    "id": "$2", "sortKey": "2", "text": "nulls",
                    "attachments": null, "reactions": null
                },
                { "id": "$3", "attachments": [{ "type": "img", "isVoiceNote": null, "isSticker": null }] }
            ],
            "hasMore": null
        }))
        .unwrap();

        assert_eq!(page.items.len(), 3);
        assert!(!page.has_more);
        assert!(page.items[1].attachments.is_empty());
        assert!(page.items[1].reactions.is_empty());
        assert!(!page.items[2].attachments[0].is_voice_note);

        let chats: ChatsPage = serde_json::from_value(json!({
            "items": [{
                "id": "!a",
                "participants": {
                    "items": [{ "id": "@a", "isSelf": null, "cannotMessage": null }],
                    "hasMore": null
                }
            }],
            "hasMore": false
        }))
        .unwrap();
        let participants = chats.items[0].participants.as_ref().unwrap();
        assert!(!participants.has_more);
        assert!(!participants.items[0].is_self);

        let empty: ChatsPage = serde_json::from_value(json!({ "items": null })).unwrap();
        assert!(empty.items.is_empty());
    }
}
