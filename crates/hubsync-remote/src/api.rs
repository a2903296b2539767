use async_trait::async_trait;
use serde::Serialize;

use hubsync_shared::types::SyncDirection;

use crate::error::RemoteError;
use crate::wire::{ChatsPage, MessagesPage, RawChat, SendResult};

/// Chat-list page request. No cursor means "most recent page".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatsQuery {
    pub cursor: Option<String>,
    pub direction: Option<SyncDirection>,
    pub limit: Option<u32>,
}

/// Message page request for one chat. No cursor means "most recent page".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagesQuery {
    pub cursor: Option<String>,
    pub direction: Option<SyncDirection>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SendRequest {
    pub text: String,
    #[serde(rename = "replyToMessageID", skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<String>,
}

/// The paginated hub contract consumed by the sync engine.
#[async_trait]
pub trait HubApi: Send + Sync {
    async fn fetch_chats_page(&self, query: &ChatsQuery) -> Result<ChatsPage, RemoteError>;

    async fn fetch_messages_page(
        &self,
        chat_id: &str,
        query: &MessagesQuery,
    ) -> Result<MessagesPage, RemoteError>;

    /// A single chat with its full participant list.
    async fn fetch_chat(&self, chat_id: &str) -> Result<RawChat, RemoteError>;

    async fn send_message(
        &self,
        chat_id: &str,
        request: &SendRequest,
    ) -> Result<SendResult, RemoteError>;

    /// Open the chat in the desktop client, optionally pre-filling a draft.
    async fn focus_chat(&self, chat_id: &str, draft_text: Option<&str>) -> Result<(), RemoteError>;
}
