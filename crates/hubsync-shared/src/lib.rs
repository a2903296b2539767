//! # hubsync-shared
//!
//! Types and pure functions shared by every hubsync crate: the enums that
//! travel between the remote adapter, the store and the engine, the constants
//! that tune a sync pass, and the normalization primitives used to turn hub
//! payloads into the canonical local shape.

pub mod constants;
pub mod error;
pub mod normalize;
pub mod types;

pub use error::SharedError;
pub use types::{ChatFilter, ChatType, MessageSide, MessageStatus, SyncDirection};
