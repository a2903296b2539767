//! Historical backfill: walk the chat list and every chat's message history
//! backwards until the hub runs out, a stop date is crossed, or a user asks
//! to stop.

use std::sync::PoisonError;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use hubsync_remote::{ChatsQuery, MessagesQuery};
use hubsync_shared::constants::BACKFILL_PAGE_SIZE;
use hubsync_shared::types::SyncDirection;
use hubsync_store::{BackfillControl, Chat};

use crate::error::{Result, SyncError};
use crate::normalize::parse_timestamp;
use crate::pagination::{CursorGuard, PageStep};
use crate::reconcile::mark_history_complete;
use crate::sync::{aborts_pass, outcome_of, SyncEngine, SyncLockGuard, SyncOutcome};
use crate::{lock_db, SharedDb};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackfillOptions {
    /// Do not go further back than this instant.
    #[serde(alias = "stopAtDate")]
    pub stop_at: Option<DateTime<Utc>>,
    /// Do not go further back than this many days.
    pub days: Option<u32>,
    pub max_pages_per_chat: Option<u32>,
}

impl BackfillOptions {
    /// The effective stop date: the later of `stop_at` and `now - days`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let by_days = self.days.map(|days| now - Duration::days(i64::from(days)));
        match (self.stop_at, by_days) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    pub run_id: String,
    pub skipped: bool,
    /// Ended early because a stop was requested.
    pub stopped: bool,
    pub chat_pages: u32,
    pub chats_processed: usize,
    pub chats_completed: usize,
    pub messages_inserted: usize,
    pub outcome: SyncOutcome,
}

/// Clears the durable running flag however the run ends.
struct RunningGuard {
    db: SharedDb,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = db.finish_backfill(Utc::now()) {
            error!(error = %err, "failed to mark backfill finished");
        }
    }
}

#[derive(Clone)]
pub struct Backfill {
    engine: SyncEngine,
}

impl Backfill {
    pub fn new(engine: SyncEngine) -> Self {
        Self { engine }
    }

    pub fn status(&self) -> Result<BackfillControl> {
        let db = lock_db(self.engine.db())?;
        Ok(db.get_backfill_control()?)
    }

    /// Ask a running backfill to stop at its next checkpoint. Returns
    /// `false` when nothing is running.
    pub fn request_stop(&self) -> Result<bool> {
        let db = lock_db(self.engine.db())?;
        if !db.get_backfill_control()?.running {
            return Ok(false);
        }
        db.set_backfill_stop_requested(true)?;
        info!("backfill stop requested");
        Ok(true)
    }

    fn stop_requested(&self) -> Result<bool> {
        let db = lock_db(self.engine.db())?;
        Ok(db.is_backfill_stop_requested()?)
    }

    pub async fn run(&self, options: BackfillOptions) -> BackfillReport {
        let run_id = Uuid::new_v4().to_string();
        let mut report = BackfillReport {
            run_id: run_id.clone(),
            ..Default::default()
        };

        let db = self.engine.db();
        let lock = match SyncLockGuard::acquire(db, &run_id, self.engine.config().lock_stale_after) {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                info!(run_id, "sync in progress, backfill skipped");
                report.skipped = true;
                return report;
            }
            Err(err) => {
                report.outcome = outcome_of(&run_id, err);
                return report;
            }
        };

        if let Err(err) = lock_db(db).and_then(|db| Ok(db.begin_backfill(Utc::now())?)) {
            report.outcome = outcome_of(&run_id, err);
            return report;
        }
        let _running = RunningGuard { db: db.clone() };

        let cutoff = options.cutoff(Utc::now());
        info!(run_id, ?cutoff, "backfill started");
        if let Err(err) = self.run_phases(&options, cutoff, &lock, &mut report).await {
            report.outcome = outcome_of(&run_id, err);
        }
        info!(
            run_id,
            stopped = report.stopped,
            chat_pages = report.chat_pages,
            chats_processed = report.chats_processed,
            chats_completed = report.chats_completed,
            messages_inserted = report.messages_inserted,
            "backfill finished"
        );
        report
    }

    async fn run_phases(
        &self,
        options: &BackfillOptions,
        cutoff: Option<DateTime<Utc>>,
        lock: &SyncLockGuard,
        report: &mut BackfillReport,
    ) -> Result<()> {
        self.backfill_chat_list(cutoff, lock, report).await?;
        if report.stopped {
            return Ok(());
        }

        let chats = {
            let db = lock_db(self.engine.db())?;
            db.list_chats_missing_history(u32::MAX)?
        };
        let max_pages = options
            .max_pages_per_chat
            .unwrap_or(self.engine.config().max_backfill_pages_per_chat);

        for chat in chats {
            if self.stop_requested()? {
                report.stopped = true;
                return Ok(());
            }
            if cutoff.is_some_and(|cutoff| chat.last_activity < cutoff) {
                debug!(chat_id = %chat.chat_id, "chat inactive since before the stop date");
                continue;
            }
            self.backfill_chat(&chat, cutoff, max_pages, lock, report).await?;
        }
        Ok(())
    }

    /// Phase one: page the chat list backwards from the stored oldest
    /// cursor, persisting the boundary after every page.
    async fn backfill_chat_list(
        &self,
        cutoff: Option<DateTime<Utc>>,
        lock: &SyncLockGuard,
        report: &mut BackfillReport,
    ) -> Result<()> {
        let mut state = {
            let db = lock_db(self.engine.db())?;
            db.get_cursor_state()?
        };
        let mut cursor = state.oldest_cursor.clone();
        let mut guard = CursorGuard::new(self.engine.config().max_chat_pages);

        loop {
            if self.stop_requested()? {
                report.stopped = true;
                return Ok(());
            }

            let query = ChatsQuery {
                direction: cursor.as_ref().map(|_| SyncDirection::Before),
                cursor: cursor.clone(),
                limit: None,
            };
            let page = self.engine.hub().fetch_chats_page(&query).await?;
            lock.refresh()?;
            report.chat_pages += 1;

            for raw in &page.items {
                if let Err(err) = self.engine.reconcile_chat(raw, Some(lock)).await {
                    if aborts_pass(&err) {
                        return Err(err);
                    }
                    warn!(chat_id = ?raw.id, error = %err, "chat reconciliation failed, skipping");
                }
            }

            if page.oldest_cursor.is_some() {
                state.oldest_cursor = page.oldest_cursor.clone();
                state.newest_cursor = state.newest_cursor.take().or(page.newest_cursor.clone());
                let db = lock_db(self.engine.db())?;
                db.save_cursor_state(&state)?;
            }

            let crossed = cutoff.is_some_and(|cutoff| {
                page.items
                    .iter()
                    .filter_map(|raw| raw.last_activity.as_deref().and_then(parse_timestamp))
                    .any(|activity| activity < cutoff)
            });
            if crossed {
                debug!("chat list reached the stop date");
                return Ok(());
            }

            match guard.advance(
                cursor.as_deref(),
                SyncDirection::Before,
                page.oldest_cursor.as_deref(),
                page.has_more,
            ) {
                PageStep::Continue => cursor = page.oldest_cursor,
                PageStep::Done => return Ok(()),
                PageStep::CycleDetected => {
                    warn!(cursor = ?page.oldest_cursor, "chat cursor repeated, stopping chat backfill");
                    return Ok(());
                }
                PageStep::PageLimit => {
                    info!(pages = guard.pages(), "chat page budget spent");
                    return Ok(());
                }
            }
        }
    }

    /// Phase two for one chat: older message pages until the start of the
    /// conversation, the stop date, or the page budget. Local failures end
    /// this chat only.
    async fn backfill_chat(
        &self,
        chat: &Chat,
        cutoff: Option<DateTime<Utc>>,
        max_pages: u32,
        lock: &SyncLockGuard,
        report: &mut BackfillReport,
    ) -> Result<()> {
        let chat_id = chat.chat_id.as_str();
        let mut cursor = chat.oldest_message_sort_key.clone();
        let mut guard = CursorGuard::new(max_pages);
        let mut inserted = 0;

        loop {
            if self.stop_requested()? {
                report.stopped = true;
                break;
            }

            let query = MessagesQuery {
                direction: cursor.as_ref().map(|_| SyncDirection::Before),
                cursor: cursor.clone(),
                limit: Some(BACKFILL_PAGE_SIZE),
            };
            let page = match self.engine.hub().fetch_messages_page(chat_id, &query).await {
                Ok(page) => page,
                Err(err) if err.is_unavailable() || err.is_fatal() => return Err(err.into()),
                Err(err) => {
                    warn!(chat_id, error = %err, "message backfill failed, skipping chat");
                    break;
                }
            };
            lock.refresh()?;

            let stored = match self.engine.store_messages(chat_id, &page.items) {
                Ok(stored) => stored,
                Err(SyncError::Poisoned) => return Err(SyncError::Poisoned),
                Err(err) => {
                    warn!(chat_id, error = %err, "storing backfilled messages failed, skipping chat");
                    break;
                }
            };
            inserted += stored.inserted;
            debug!(chat_id, inserted = stored.inserted, has_more = page.has_more, "backfilled message page");

            if !page.has_more {
                let db = lock_db(self.engine.db())?;
                match mark_history_complete(&db, chat_id, Utc::now()) {
                    Ok(()) => report.chats_completed += 1,
                    Err(err) => warn!(chat_id, error = %err, "failed to mark history complete"),
                }
                break;
            }
            let Some(oldest) = stored.oldest_sort_key else {
                break;
            };
            if cursor.as_deref() == Some(oldest.as_str()) {
                warn!(chat_id, cursor = %oldest, "message cursor did not move");
                break;
            }
            if let (Some(cutoff), Some(reached)) = (cutoff, stored.oldest_timestamp) {
                if reached < cutoff {
                    break;
                }
            }
            match guard.advance(cursor.as_deref(), SyncDirection::Before, Some(&oldest), true) {
                PageStep::Continue => cursor = Some(oldest),
                PageStep::PageLimit => {
                    debug!(chat_id, pages = guard.pages(), "message page budget spent");
                    break;
                }
                PageStep::Done | PageStep::CycleDetected => break,
            }
        }

        report.chats_processed += 1;
        report.messages_inserted += inserted;
        let db = lock_db(self.engine.db())?;
        db.record_backfill_progress(1, inserted as i64)?;
        Ok(())
    }
}
