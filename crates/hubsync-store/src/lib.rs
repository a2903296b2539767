//! # hubsync-store
//!
//! Local SQLite cache mirroring the messaging hub.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for chats,
//! messages, participants and contacts, plus the durable sync bookkeeping
//! (cursor state, the sync lock and backfill control).

pub mod chats;
pub mod contacts;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod participants;
pub mod sync_state;

mod error;
mod sql;

pub use database::{Database, SORT_KEY_COLLATION};
pub use error::{Result, StoreError};
pub use models::*;
