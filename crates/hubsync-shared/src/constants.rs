/// Application name
pub const APP_NAME: &str = "hubsync";

/// Default hub API base URL (the desktop hub listens on loopback)
pub const DEFAULT_HUB_BASE_URL: &str = "http://localhost:23373/v1";

/// Default HTTP API address of the daemon
pub const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:8787";

/// Messages fetched per chat during a regular sync pass
pub const DEFAULT_MESSAGES_PER_CHAT: u32 = 15;

/// Messages fetched per page during historical backfill
pub const BACKFILL_PAGE_SIZE: u32 = 50;

/// Upper bound on chat-list pages followed in one catch-up loop
pub const DEFAULT_MAX_CHAT_PAGES: u32 = 20;

/// Upper bound on message pages requested per chat during backfill
pub const DEFAULT_MAX_BACKFILL_PAGES_PER_CHAT: u32 = 200;

/// Concurrent per-chat message fetches inside one sync pass
pub const MESSAGE_FETCH_CONCURRENCY: usize = 4;

/// Seconds after which a held sync lock is considered abandoned
pub const DEFAULT_LOCK_STALE_SECS: i64 = 600;

/// Periodic sync interval in seconds
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;

/// Remote request attempts (first try included)
pub const DEFAULT_HUB_MAX_ATTEMPTS: u32 = 3;

/// Default country calling code applied by phone normalization
pub const DEFAULT_PHONE_COUNTRY_CODE: &str = "66";

/// Default bot pseudo-participant names (case-insensitive substring match)
pub const DEFAULT_BOT_NAMES: &[&str] = &["meta ai"];

/// Prefix of synthetic identifiers given to optimistically inserted messages
pub const LOCAL_MESSAGE_PREFIX: &str = "local-";

/// Source tag written to the cursor state row
pub const CURSOR_SOURCE_TAG: &str = "hub";
