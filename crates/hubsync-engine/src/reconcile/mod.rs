//! Idempotent upserts of normalized hub records into the store.
//!
//! Every public function here is one storage transaction. Nothing spans
//! several chats, so a pass interrupted halfway leaves consistent rows and
//! re-running it is harmless.

pub mod chats;
pub mod contacts;
pub mod messages;
pub mod participants;

pub use chats::{upsert_chat, ChatUpsertOutcome};
pub use contacts::resolve_contact;
pub use messages::{insert_local_message, mark_history_complete, upsert_messages};
pub use participants::{upsert_participants, ParticipantUpsertOutcome};
