//! Durable sync bookkeeping: chat-list cursors, the sync lock and the
//! backfill control row.
//!
//! All three live in single-row tables created by the initial migration.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;
use crate::models::{BackfillControl, CursorState, SyncLock};
use crate::sql::{opt_ts_from_sql, opt_ts_to_sql, ts_from_sql, ts_to_sql};

impl Database {
    // ------------------------------------------------------------------
    // Cursor state
    // ------------------------------------------------------------------

    pub fn get_cursor_state(&self) -> Result<CursorState> {
        let state = self
            .conn()
            .query_row(
                "SELECT newest_cursor, oldest_cursor, last_synced_at, source, total_chats
                 FROM sync_state WHERE id = 1",
                [],
                |row| {
                    let synced: Option<String> = row.get(2)?;
                    Ok(CursorState {
                        newest_cursor: row.get(0)?,
                        oldest_cursor: row.get(1)?,
                        last_synced_at: opt_ts_from_sql(2, synced)?,
                        source: row.get(3)?,
                        total_chats: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(state.unwrap_or_default())
    }

    pub fn save_cursor_state(&self, state: &CursorState) -> Result<()> {
        self.conn().execute(
            "INSERT INTO sync_state (id, newest_cursor, oldest_cursor, last_synced_at, source, total_chats)
             VALUES (1, ?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                newest_cursor = excluded.newest_cursor,
                oldest_cursor = excluded.oldest_cursor,
                last_synced_at = excluded.last_synced_at,
                source = excluded.source,
                total_chats = excluded.total_chats",
            params![
                state.newest_cursor,
                state.oldest_cursor,
                opt_ts_to_sql(state.last_synced_at.as_ref()),
                state.source,
                state.total_chats,
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sync lock
    // ------------------------------------------------------------------

    /// Try to take the sync lock for `holder`.
    ///
    /// A single atomic upsert: it succeeds when the lock is free or was
    /// acquired before `stale_before`, and otherwise changes nothing.
    pub fn try_acquire_sync_lock(
        &self,
        holder: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT INTO sync_lock (id, holder, acquired_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
                holder = excluded.holder,
                acquired_at = excluded.acquired_at
             WHERE sync_lock.holder IS NULL OR sync_lock.acquired_at < ?3",
            params![holder, ts_to_sql(&now), ts_to_sql(&stale_before)],
        )?;
        Ok(affected > 0)
    }

    /// Push the acquisition time of a held lock forward so that a long run
    /// is not mistaken for a crashed one. `false` when `holder` no longer
    /// owns the lock.
    pub fn refresh_sync_lock(&self, holder: &str, now: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE sync_lock SET acquired_at = ?2 WHERE id = 1 AND holder = ?1",
            params![holder, ts_to_sql(&now)],
        )?;
        Ok(affected > 0)
    }

    /// Release the lock if `holder` still owns it.
    pub fn release_sync_lock(&self, holder: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE sync_lock SET holder = NULL, acquired_at = NULL
             WHERE id = 1 AND holder = ?1",
            params![holder],
        )?;
        Ok(affected > 0)
    }

    pub fn current_sync_lock(&self) -> Result<Option<SyncLock>> {
        let row: Option<(Option<String>, Option<String>)> = self
            .conn()
            .query_row(
                "SELECT holder, acquired_at FROM sync_lock WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((Some(holder), Some(acquired_at))) => Ok(Some(SyncLock {
                holder,
                acquired_at: ts_from_sql(1, &acquired_at)?,
            })),
            _ => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Backfill control
    // ------------------------------------------------------------------

    pub fn get_backfill_control(&self) -> Result<BackfillControl> {
        let control = self
            .conn()
            .query_row(
                "SELECT running, stop_requested, started_at, finished_at,
                        chats_processed, messages_inserted
                 FROM backfill_control WHERE id = 1",
                [],
                |row| {
                    let started: Option<String> = row.get(2)?;
                    let finished: Option<String> = row.get(3)?;
                    Ok(BackfillControl {
                        running: row.get(0)?,
                        stop_requested: row.get(1)?,
                        started_at: opt_ts_from_sql(2, started)?,
                        finished_at: opt_ts_from_sql(3, finished)?,
                        chats_processed: row.get(4)?,
                        messages_inserted: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(control.unwrap_or_default())
    }

    /// Mark a backfill as running and reset its counters and stop flag.
    pub fn begin_backfill(&self, now: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "INSERT INTO backfill_control (id, running, stop_requested, started_at, finished_at,
                                           chats_processed, messages_inserted)
             VALUES (1, 1, 0, ?1, NULL, 0, 0)
             ON CONFLICT(id) DO UPDATE SET
                running = 1, stop_requested = 0, started_at = ?1, finished_at = NULL,
                chats_processed = 0, messages_inserted = 0",
            params![ts_to_sql(&now)],
        )?;
        Ok(())
    }

    pub fn set_backfill_stop_requested(&self, requested: bool) -> Result<()> {
        self.conn().execute(
            "UPDATE backfill_control SET stop_requested = ?1 WHERE id = 1",
            params![requested],
        )?;
        Ok(())
    }

    pub fn is_backfill_stop_requested(&self) -> Result<bool> {
        Ok(self
            .conn()
            .query_row(
                "SELECT stop_requested FROM backfill_control WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(false))
    }

    pub fn record_backfill_progress(&self, chats: i64, messages: i64) -> Result<()> {
        self.conn().execute(
            "UPDATE backfill_control
             SET chats_processed = chats_processed + ?1,
                 messages_inserted = messages_inserted + ?2
             WHERE id = 1",
            params![chats, messages],
        )?;
        Ok(())
    }

    pub fn finish_backfill(&self, now: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "UPDATE backfill_control
             SET running = 0, stop_requested = 0, finished_at = ?1
             WHERE id = 1",
            params![ts_to_sql(&now)],
        )?;
        Ok(())
    }
}
