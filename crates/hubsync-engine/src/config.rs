use chrono::Duration;

use hubsync_shared::constants::{
    DEFAULT_LOCK_STALE_SECS, DEFAULT_MAX_BACKFILL_PAGES_PER_CHAT, DEFAULT_MAX_CHAT_PAGES,
    DEFAULT_MESSAGES_PER_CHAT, MESSAGE_FETCH_CONCURRENCY,
};
use hubsync_shared::normalize::{BotDenylist, PhoneRules};

/// Tuning knobs of a sync pass.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Messages requested for each chat that needs a message refresh.
    pub messages_per_chat: u32,
    /// Chat-list pages followed in one catch-up loop.
    pub max_chat_pages: u32,
    /// Message pages requested per chat by a backfill run.
    pub max_backfill_pages_per_chat: u32,
    /// A lock held longer than this may be taken over.
    pub lock_stale_after: Duration,
    pub message_fetch_concurrency: usize,
    pub phone_rules: PhoneRules,
    pub bots: BotDenylist,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            messages_per_chat: DEFAULT_MESSAGES_PER_CHAT,
            max_chat_pages: DEFAULT_MAX_CHAT_PAGES,
            max_backfill_pages_per_chat: DEFAULT_MAX_BACKFILL_PAGES_PER_CHAT,
            lock_stale_after: Duration::seconds(DEFAULT_LOCK_STALE_SECS),
            message_fetch_concurrency: MESSAGE_FETCH_CONCURRENCY,
            phone_rules: PhoneRules::default(),
            bots: BotDenylist::default(),
        }
    }
}
