//! # hubsync-engine
//!
//! Incremental synchronization between the messaging hub and the local
//! cache: raw-to-canonical mapping, idempotent reconciliation, the sync
//! orchestrator with its durable lock, historical backfill, optimistic
//! sends and the read-side queries used by the HTTP API.
//!
//! The [`Database`] is shared as `Arc<Mutex<Database>>` and is only ever
//! locked between suspension points, never across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard};

use hubsync_store::Database;

pub mod backfill;
pub mod config;
pub mod error;
pub mod normalize;
pub mod pagination;
pub mod query;
pub mod reconcile;
pub mod send;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use backfill::{Backfill, BackfillOptions, BackfillReport};
pub use config::EngineConfig;
pub use error::{Result, SyncError};
pub use query::{ChatDetail, ChatListQuery, MessageListQuery};
pub use sync::{OlderMessages, SyncEngine, SyncMode, SyncOutcome, SyncReport};

/// Database handle shared between the engine, the scheduler and the API.
pub type SharedDb = Arc<Mutex<Database>>;

/// Wrap a database for sharing.
pub fn shared(db: Database) -> SharedDb {
    Arc::new(Mutex::new(db))
}

pub(crate) fn lock_db(db: &SharedDb) -> Result<MutexGuard<'_, Database>> {
    db.lock().map_err(|_| SyncError::Poisoned)
}
