//! # hubsyncd
//!
//! Local sync daemon for the messaging hub.
//!
//! This binary provides:
//! - **Periodic incremental sync** of chats and messages from the hub into
//!   a local SQLite cache
//! - **Historical backfill** on demand, stoppable at any time
//! - **REST API** (axum) serving the cached chats to the UI, plus optimistic
//!   sends and manual contact linking

mod api;
mod config;
mod error;
mod scheduler;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hubsync_engine::{shared, Backfill, SyncEngine};
use hubsync_remote::{HubClient, RetryPolicy};
use hubsync_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::scheduler::Scheduler;

fn open_database(config: &ServerConfig) -> anyhow::Result<Database> {
    let db = match &config.database_path {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("creating database directory {}", dir.display()))?;
            }
            info!(path = %path.display(), "opening database");
            Database::open_at(path)?
        }
        None => Database::new()?,
    };
    Ok(db)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,hubsync_engine=debug,hubsync_server=debug")),
        )
        .init();

    info!("Starting hubsyncd v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    let hub_config = config.hub_client_config()?;
    info!(
        hub = %config.hub_base_url,
        http_addr = %config.http_addr,
        interval_secs = config.sync_interval.as_secs(),
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = open_database(&config)?;
    let phone_rules = config.phone_rules();
    let reindexed = db.reindex_contact_phones(&phone_rules)?;
    if reindexed > 0 {
        info!(contacts = reindexed, "indexed contact phone numbers");
    }

    let hub = Arc::new(HubClient::new(hub_config)?);
    let engine = SyncEngine::new(shared(db), hub, config.engine_config());
    let backfill = Backfill::new(engine.clone());

    // -----------------------------------------------------------------------
    // 4. Spawn the scheduler (first incremental sync runs right away)
    // -----------------------------------------------------------------------
    let retry = RetryPolicy {
        max_attempts: config.hub_max_attempts,
        ..RetryPolicy::default()
    };
    let (scheduler, scheduler_task) = Scheduler::new(engine.clone(), config.sync_interval, retry).spawn();

    let app_state = AppState {
        engine,
        backfill: backfill.clone(),
        scheduler: scheduler.clone(),
        phone_rules,
    };

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    // A running backfill stops at its next checkpoint; an in-flight sync
    // pass finishes so its lock is released cleanly.
    match backfill.request_stop() {
        Ok(true) => info!("asked the running backfill to stop"),
        Ok(false) => {}
        Err(e) => tracing::warn!(error = %e, "could not request backfill stop"),
    }
    scheduler.shutdown().await;
    if let Err(e) = scheduler_task.await {
        tracing::warn!(error = %e, "scheduler task ended abnormally");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_path_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            database_path: Some(dir.path().join("nested").join("hubsync.db")),
            ..ServerConfig::default()
        };
        let db = open_database(&config).unwrap();
        assert_eq!(db.count_chats().unwrap(), 0);
        assert!(dir.path().join("nested").join("hubsync.db").exists());
    }
}
