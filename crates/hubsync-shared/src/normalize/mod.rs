//! Normalization primitives for hub payloads.
//!
//! These functions are pure and never fail: malformed input degrades to a
//! safe fallback (empty text, lexical ordering, unchanged digits) instead of
//! aborting a batch.

pub mod bots;
pub mod names;
pub mod phone;
pub mod sort_key;
pub mod text;

pub use bots::BotDenylist;
pub use names::{
    is_name_improvement, looks_like_raw_identifier, normalize_handle, pick_display_name,
};
pub use phone::{normalize_phone, PhoneRules};
pub use sort_key::{compare_sort_keys, is_sort_key_older};
pub use text::extract_message_text;
