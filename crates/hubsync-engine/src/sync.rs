//! The sync orchestrator.
//!
//! A pass goes through `lock -> catch-up chats -> per-chat messages ->
//! persist cursors -> unlock`. The lock lives in the database so that every
//! trigger (scheduler, API, backfill) shares it, and it is released by a
//! drop guard on every exit path.

use std::sync::{Arc, PoisonError};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use hubsync_remote::{ChatsQuery, HubApi, MessagesQuery, RawChat, RawMessage, RemoteError};
use hubsync_shared::constants::{BACKFILL_PAGE_SIZE, CURSOR_SOURCE_TAG};
use hubsync_shared::types::SyncDirection;
use hubsync_store::CursorState;

use crate::config::EngineConfig;
use crate::error::{Result, SyncError};
use crate::normalize::{normalize_chat, normalize_messages};
use crate::pagination::{CursorGuard, PageStep};
use crate::reconcile::{mark_history_complete, upsert_chat, upsert_messages, upsert_participants, ChatUpsertOutcome};
use crate::{lock_db, SharedDb};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncMode {
    /// Follow the stored newest cursor forward.
    #[default]
    Incremental,
    /// Ignore the stored cursor and start from the most recent page.
    Full,
    /// Chats only; message loading is left to on-demand per-chat calls.
    PageLoad,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "camelCase")]
pub enum SyncOutcome {
    #[default]
    Completed,
    /// The hub was unreachable; the next run resumes from the same cursor.
    Unavailable(String),
    /// Rejected credentials or misconfiguration; retrying cannot help.
    Fatal(String),
    Failed(String),
}

impl SyncOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub run_id: String,
    /// Another run held the lock; nothing was written.
    pub skipped: bool,
    pub chats_seen: usize,
    pub chats_inserted: usize,
    pub chats_updated: usize,
    pub messages_inserted: usize,
    pub pages: u32,
    pub outcome: SyncOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OlderMessages {
    pub inserted: usize,
    pub has_more: bool,
}

/// Result of storing one page of messages.
pub(crate) struct StoredPage {
    pub inserted: usize,
    pub oldest_sort_key: Option<String>,
    pub oldest_timestamp: Option<DateTime<Utc>>,
}

/// Holds the durable sync lock and releases it on drop.
pub(crate) struct SyncLockGuard {
    db: SharedDb,
    holder: String,
}

impl SyncLockGuard {
    /// `Ok(None)` when another live run holds the lock.
    pub(crate) fn acquire(
        db: &SharedDb,
        holder: &str,
        stale_after: chrono::Duration,
    ) -> Result<Option<Self>> {
        let now = Utc::now();
        let acquired = {
            let db = lock_db(db)?;
            db.try_acquire_sync_lock(holder, now, now - stale_after)?
        };
        Ok(acquired.then(|| Self {
            db: db.clone(),
            holder: holder.to_string(),
        }))
    }

    /// Confirm the lock is still ours and restart its stale timer. Called
    /// after every suspension point of a long pass, before writing.
    pub(crate) fn refresh(&self) -> Result<()> {
        let db = lock_db(&self.db)?;
        if db.refresh_sync_lock(&self.holder, Utc::now())? {
            Ok(())
        } else {
            warn!(holder = %self.holder, "sync lock taken over, abandoning run");
            Err(SyncError::LockLost(self.holder.clone()))
        }
    }
}

impl Drop for SyncLockGuard {
    fn drop(&mut self) {
        // A poisoned mutex still wraps a usable connection; releasing beats
        // waiting for the stale timeout.
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        match db.release_sync_lock(&self.holder) {
            Ok(true) => debug!(holder = %self.holder, "sync lock released"),
            Ok(false) => warn!(holder = %self.holder, "sync lock was taken over before release"),
            Err(err) => error!(holder = %self.holder, error = %err, "failed to release sync lock"),
        }
    }
}

/// Log `err` at the severity its class deserves and turn it into an outcome.
pub(crate) fn outcome_of(run_id: &str, err: SyncError) -> SyncOutcome {
    if err.is_unavailable() {
        info!(run_id, reason = %err, "hub unavailable, deferring to the next run");
        SyncOutcome::Unavailable(err.to_string())
    } else if err.is_fatal() {
        error!(run_id, error = %err, "sync failed, check the hub token and address");
        SyncOutcome::Fatal(err.to_string())
    } else {
        error!(run_id, error = %err, "sync failed");
        SyncOutcome::Failed(err.to_string())
    }
}

/// Errors that end a whole pass instead of skipping one chat.
pub(crate) fn aborts_pass(err: &SyncError) -> bool {
    err.is_unavailable() || err.is_fatal() || matches!(err, SyncError::LockLost(_) | SyncError::Poisoned)
}

#[derive(Clone)]
pub struct SyncEngine {
    db: SharedDb,
    hub: Arc<dyn HubApi>,
    config: Arc<EngineConfig>,
}

impl SyncEngine {
    pub fn new(db: SharedDb, hub: Arc<dyn HubApi>, config: EngineConfig) -> Self {
        Self {
            db,
            hub,
            config: Arc::new(config),
        }
    }

    pub fn db(&self) -> &SharedDb {
        &self.db
    }

    pub fn hub(&self) -> &Arc<dyn HubApi> {
        &self.hub
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one sync pass. Never fails: errors are classified into the
    /// report's outcome, and a held lock yields `skipped: true`.
    pub async fn run_sync(&self, mode: SyncMode) -> SyncReport {
        let run_id = Uuid::new_v4().to_string();
        let mut report = SyncReport {
            run_id: run_id.clone(),
            ..Default::default()
        };

        let lock = match SyncLockGuard::acquire(&self.db, &run_id, self.config.lock_stale_after) {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                info!(run_id, ?mode, "sync already in progress, skipping");
                report.skipped = true;
                return report;
            }
            Err(err) => {
                report.outcome = outcome_of(&run_id, err);
                return report;
            }
        };

        info!(run_id, ?mode, "sync started");
        if let Err(err) = self.sync_pass(mode, &lock, &mut report).await {
            report.outcome = outcome_of(&run_id, err);
        }
        info!(
            run_id,
            chats_seen = report.chats_seen,
            chats_inserted = report.chats_inserted,
            chats_updated = report.chats_updated,
            messages_inserted = report.messages_inserted,
            pages = report.pages,
            "sync finished"
        );
        report
    }

    async fn sync_pass(&self, mode: SyncMode, lock: &SyncLockGuard, report: &mut SyncReport) -> Result<()> {
        let state = {
            let db = lock_db(&self.db)?;
            db.get_cursor_state()?
        };

        let mut cursor = match mode {
            SyncMode::Full => None,
            SyncMode::Incremental | SyncMode::PageLoad => state.newest_cursor.clone(),
        };
        let mut newest = state.newest_cursor.clone();
        let mut oldest = state.oldest_cursor.clone();
        let mut guard = CursorGuard::new(self.config.max_chat_pages);
        let mut pending = Vec::new();

        loop {
            let query = ChatsQuery {
                cursor: cursor.clone(),
                direction: cursor.as_ref().map(|_| SyncDirection::After),
                limit: None,
            };
            let page = self.hub.fetch_chats_page(&query).await?;
            lock.refresh()?;
            report.pages += 1;
            report.chats_seen += page.items.len();
            debug!(
                page = report.pages,
                items = page.items.len(),
                has_more = page.has_more,
                "fetched chat page"
            );

            for raw in &page.items {
                match self.reconcile_chat(raw, Some(lock)).await {
                    Ok(Some((chat_id, outcome))) => {
                        report.chats_inserted += usize::from(outcome.inserted);
                        report.chats_updated += usize::from(outcome.updated);
                        if outcome.needs_message_sync && mode != SyncMode::PageLoad {
                            pending.push(chat_id);
                        }
                    }
                    Ok(None) => {}
                    Err(err) if aborts_pass(&err) => return Err(err),
                    Err(err) => {
                        warn!(chat_id = ?raw.id, error = %err, "chat reconciliation failed, skipping")
                    }
                }
            }

            if page.newest_cursor.is_some() {
                newest = page.newest_cursor.clone();
            }

            // Without a cursor the hub returns its most recent page; there
            // is nothing newer to follow.
            let Some(requested) = cursor.as_deref() else {
                if oldest.is_none() || mode == SyncMode::Full {
                    oldest = page.oldest_cursor.clone().or(oldest);
                }
                break;
            };

            match guard.advance(
                Some(requested),
                SyncDirection::After,
                page.newest_cursor.as_deref(),
                page.has_more,
            ) {
                PageStep::Continue => cursor = page.newest_cursor.clone(),
                PageStep::Done => break,
                PageStep::CycleDetected => {
                    warn!(cursor = ?page.newest_cursor, "chat cursor repeated, stopping catch-up");
                    break;
                }
                PageStep::PageLimit => {
                    info!(pages = guard.pages(), "chat page budget spent, resuming next run");
                    break;
                }
            }
        }

        self.sync_pending_messages(pending, lock, report).await?;

        lock.refresh()?;
        let db = lock_db(&self.db)?;
        let total_chats = db.count_chats()?;
        db.save_cursor_state(&CursorState {
            newest_cursor: newest,
            oldest_cursor: oldest,
            last_synced_at: Some(Utc::now()),
            source: Some(CURSOR_SOURCE_TAG.to_string()),
            total_chats,
        })?;
        Ok(())
    }

    /// Normalize and upsert one chat, then its participants if the chat is
    /// new or changed. `Ok(None)` for records that cannot be keyed.
    pub(crate) async fn reconcile_chat(
        &self,
        raw: &RawChat,
        lock: Option<&SyncLockGuard>,
    ) -> Result<Option<(String, ChatUpsertOutcome)>> {
        let Some(mut chat) = normalize_chat(raw, &self.config.bots) else {
            return Ok(None);
        };

        let outcome = {
            let db = lock_db(&self.db)?;
            upsert_chat(&db, &chat, &self.config.phone_rules, Utc::now())?
        };

        if outcome.inserted || outcome.updated {
            if chat.participants_truncated {
                match self.hub.fetch_chat(&chat.chat_id).await {
                    Ok(full) => {
                        if let Some(full) = normalize_chat(&full, &self.config.bots) {
                            chat.participants = full.participants;
                        }
                    }
                    Err(err) if err.is_unavailable() || err.is_fatal() => return Err(err.into()),
                    Err(err) => {
                        debug!(chat_id = %chat.chat_id, error = %err, "keeping truncated participant list")
                    }
                }
                if let Some(lock) = lock {
                    lock.refresh()?;
                }
            }

            let db = lock_db(&self.db)?;
            upsert_participants(
                &db,
                &chat.chat_id,
                &chat.participants,
                &self.config.bots,
                &self.config.phone_rules,
                Utc::now(),
            )?;
        }

        Ok(Some((chat.chat_id, outcome)))
    }

    /// Fetch the latest messages of every chat in `chat_ids` concurrently
    /// and apply the pages one at a time.
    async fn sync_pending_messages(
        &self,
        chat_ids: Vec<String>,
        lock: &SyncLockGuard,
        report: &mut SyncReport,
    ) -> Result<()> {
        if chat_ids.is_empty() {
            return Ok(());
        }

        let hub = &self.hub;
        let limit = self.config.messages_per_chat;
        let pages: Vec<(String, std::result::Result<_, RemoteError>)> = stream::iter(chat_ids)
            .map(move |chat_id| async move {
                let query = MessagesQuery {
                    cursor: None,
                    direction: None,
                    limit: Some(limit),
                };
                let page = hub.fetch_messages_page(&chat_id, &query).await;
                (chat_id, page)
            })
            .buffer_unordered(self.config.message_fetch_concurrency.max(1))
            .collect()
            .await;
        lock.refresh()?;

        let mut deferred: Option<SyncError> = None;
        for (chat_id, page) in pages {
            let page = match page {
                Ok(page) => page,
                Err(err) if err.is_unavailable() || err.is_fatal() => {
                    deferred.get_or_insert(err.into());
                    continue;
                }
                Err(err) => {
                    warn!(chat_id, error = %err, "message fetch failed, skipping chat");
                    continue;
                }
            };
            match self.store_messages(&chat_id, &page.items) {
                Ok(stored) => report.messages_inserted += stored.inserted,
                Err(err) => warn!(chat_id, error = %err, "message reconciliation failed, skipping chat"),
            }
        }

        match deferred {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub(crate) fn store_messages(&self, chat_id: &str, items: &[RawMessage]) -> Result<StoredPage> {
        let db = lock_db(&self.db)?;
        let account_id = db
            .get_chat(chat_id)
            .map_err(SyncError::chat_lookup(chat_id))?
            .account_id;
        let batch = normalize_messages(items, chat_id, &account_id);
        let inserted = upsert_messages(&db, chat_id, &batch, Utc::now())?;
        let oldest = batch.first();
        Ok(StoredPage {
            inserted,
            oldest_sort_key: oldest.map(|m| m.sort_key.clone()),
            oldest_timestamp: oldest.map(|m| m.timestamp),
        })
    }

    /// Refresh the latest messages of one chat, e.g. when it is opened.
    /// A chat the cache has never seen is fetched from the hub first.
    pub async fn sync_chat_messages(&self, chat_id: &str) -> Result<usize> {
        let known = {
            let db = lock_db(&self.db)?;
            db.find_chat(chat_id)?.is_some()
        };
        if !known {
            let raw = self.hub.fetch_chat(chat_id).await?;
            if self.reconcile_chat(&raw, None).await?.is_none() {
                return Err(SyncError::ChatNotFound(chat_id.to_string()));
            }
        }

        let query = MessagesQuery {
            cursor: None,
            direction: None,
            limit: Some(self.config.messages_per_chat),
        };
        let page = self.hub.fetch_messages_page(chat_id, &query).await?;
        let stored = self.store_messages(chat_id, &page.items)?;
        debug!(chat_id, inserted = stored.inserted, "chat messages refreshed");
        Ok(stored.inserted)
    }

    /// Fetch one page of messages older than the oldest cached one.
    pub async fn load_older_messages(&self, chat_id: &str) -> Result<OlderMessages> {
        let chat = {
            let db = lock_db(&self.db)?;
            db.get_chat(chat_id).map_err(SyncError::chat_lookup(chat_id))?
        };
        if chat.has_complete_history {
            return Ok(OlderMessages::default());
        }

        let cursor = chat.oldest_message_sort_key;
        let query = MessagesQuery {
            direction: cursor.as_ref().map(|_| SyncDirection::Before),
            cursor,
            limit: Some(BACKFILL_PAGE_SIZE),
        };
        let page = self.hub.fetch_messages_page(chat_id, &query).await?;
        let stored = self.store_messages(chat_id, &page.items)?;
        if !page.has_more {
            let db = lock_db(&self.db)?;
            mark_history_complete(&db, chat_id, Utc::now())?;
        }

        Ok(OlderMessages {
            inserted: stored.inserted,
            has_more: page.has_more,
        })
    }
}
