//! Remote client adapter for the desktop messaging hub.
//!
//! The hub exposes chats, messages and participants through a paginated
//! HTTP API with opaque cursors. This crate wraps it behind the [`HubApi`]
//! trait ("fetch a page, get cursors + has-more"), with bounded retries and
//! an error taxonomy that separates fatal, retryable and expected-transient
//! failures.

pub mod api;
pub mod client;
pub mod error;
pub mod retry;
pub mod wire;

pub use api::{ChatsQuery, HubApi, MessagesQuery, SendRequest};
pub use client::{HubClient, HubClientConfig};
pub use error::{looks_like_unavailable, RemoteError};
pub use retry::RetryPolicy;
pub use wire::{
    ChatsPage, MessagesPage, RawAttachment, RawChat, RawMessage, RawParticipant,
    RawParticipantList, RawReaction, SendResult,
};
