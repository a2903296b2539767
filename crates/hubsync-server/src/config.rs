//! Daemon configuration loaded from environment variables.
//!
//! Everything but the hub token has a default, so a local install only
//! needs `HUB_TOKEN` to start.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use hubsync_engine::EngineConfig;
use hubsync_remote::{HubClientConfig, RetryPolicy};
use hubsync_shared::constants::{
    DEFAULT_BOT_NAMES, DEFAULT_HTTP_ADDR, DEFAULT_HUB_BASE_URL, DEFAULT_HUB_MAX_ATTEMPTS,
    DEFAULT_LOCK_STALE_SECS, DEFAULT_MAX_CHAT_PAGES, DEFAULT_MESSAGES_PER_CHAT,
    DEFAULT_PHONE_COUNTRY_CODE, DEFAULT_SYNC_INTERVAL_SECS,
};
use hubsync_shared::normalize::{BotDenylist, PhoneRules};

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Env: `HUB_BASE_URL`
    pub hub_base_url: String,

    /// Bearer token for the hub. Required.
    /// Env: `HUB_TOKEN`
    pub hub_token: Option<String>,

    /// Env: `HTTP_ADDR`
    /// Default: `127.0.0.1:8787`
    pub http_addr: SocketAddr,

    /// Env: `DATABASE_PATH`
    /// Default: the platform data directory.
    pub database_path: Option<PathBuf>,

    /// Env: `SYNC_INTERVAL_SECS`
    pub sync_interval: Duration,

    /// Env: `SYNC_MAX_PAGES`
    pub max_chat_pages: u32,

    /// Env: `MESSAGES_PER_CHAT`
    pub messages_per_chat: u32,

    /// Env: `LOCK_STALE_SECS`
    pub lock_stale_secs: i64,

    /// Attempts per hub request and per scheduled task.
    /// Env: `HUB_MAX_RETRIES`
    pub hub_max_attempts: u32,

    /// Env: `PHONE_COUNTRY_CODE`
    pub phone_country_code: String,

    /// Comma-separated bot display names.
    /// Env: `BOT_NAMES`
    pub bot_names: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hub_base_url: DEFAULT_HUB_BASE_URL.to_string(),
            hub_token: None,
            http_addr: DEFAULT_HTTP_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8787))),
            database_path: None,
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            max_chat_pages: DEFAULT_MAX_CHAT_PAGES,
            messages_per_chat: DEFAULT_MESSAGES_PER_CHAT,
            lock_stale_secs: DEFAULT_LOCK_STALE_SECS,
            hub_max_attempts: DEFAULT_HUB_MAX_ATTEMPTS,
            phone_country_code: DEFAULT_PHONE_COUNTRY_CODE.to_string(),
            bot_names: DEFAULT_BOT_NAMES.join(","),
        }
    }
}

/// Parse `value` for `key`, keeping `current` (with a warning) if it does
/// not parse or is not positive.
fn parse_positive<T>(key: &str, value: &str, current: T) -> T
where
    T: FromStr + PartialOrd + Default + Copy,
{
    match value.trim().parse::<T>() {
        Ok(parsed) if parsed > T::default() => parsed,
        _ => {
            tracing::warn!(key, value, "invalid value, using default");
            current
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("HUB_BASE_URL").filter(|v| !v.trim().is_empty()) {
            config.hub_base_url = url.trim().to_string();
        }

        config.hub_token = lookup("HUB_TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        if let Some(addr) = lookup("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(path) = lookup("DATABASE_PATH").filter(|v| !v.trim().is_empty()) {
            config.database_path = Some(PathBuf::from(path));
        }

        if let Some(val) = lookup("SYNC_INTERVAL_SECS") {
            let secs = parse_positive("SYNC_INTERVAL_SECS", &val, config.sync_interval.as_secs());
            config.sync_interval = Duration::from_secs(secs);
        }
        if let Some(val) = lookup("SYNC_MAX_PAGES") {
            config.max_chat_pages = parse_positive("SYNC_MAX_PAGES", &val, config.max_chat_pages);
        }
        if let Some(val) = lookup("MESSAGES_PER_CHAT") {
            config.messages_per_chat = parse_positive("MESSAGES_PER_CHAT", &val, config.messages_per_chat);
        }
        if let Some(val) = lookup("LOCK_STALE_SECS") {
            config.lock_stale_secs = parse_positive("LOCK_STALE_SECS", &val, config.lock_stale_secs);
        }
        if let Some(val) = lookup("HUB_MAX_RETRIES") {
            config.hub_max_attempts = parse_positive("HUB_MAX_RETRIES", &val, config.hub_max_attempts);
        }

        if let Some(code) = lookup("PHONE_COUNTRY_CODE") {
            let digits: String = code.chars().filter(char::is_ascii_digit).collect();
            if digits.is_empty() {
                tracing::warn!(value = %code, "Invalid PHONE_COUNTRY_CODE, using default");
            } else {
                config.phone_country_code = digits;
            }
        }

        if let Some(names) = lookup("BOT_NAMES") {
            config.bot_names = names;
        }

        config
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            messages_per_chat: self.messages_per_chat,
            max_chat_pages: self.max_chat_pages,
            lock_stale_after: chrono::Duration::seconds(self.lock_stale_secs),
            phone_rules: self.phone_rules(),
            bots: BotDenylist::from_csv(&self.bot_names),
            ..EngineConfig::default()
        }
    }

    pub fn phone_rules(&self) -> PhoneRules {
        PhoneRules::with_country_code(self.phone_country_code.clone())
    }

    /// Hub client settings. Fails without a token.
    pub fn hub_client_config(&self) -> Result<HubClientConfig, ConfigError> {
        let token = self.hub_token.clone().ok_or(ConfigError::MissingToken)?;
        Ok(HubClientConfig {
            base_url: self.hub_base_url.clone(),
            token,
            retry: RetryPolicy {
                max_attempts: self.hub_max_attempts,
                ..RetryPolicy::default()
            },
            ..HubClientConfig::default()
        })
    }
}
