//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees that
//! the sort-key collation is registered and migrations are run before any
//! other operation.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use hubsync_shared::normalize::compare_sort_keys;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

/// Collation ordering hub sort keys numerically when both sides are numbers
/// and lexically otherwise. Use as `ORDER BY sort_key COLLATE SORTKEY`.
pub const SORT_KEY_COLLATION: &str = "SORTKEY";

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/hubsync/hubsync.db`
    /// - macOS:   `~/Library/Application Support/dev.hubsync.hubsync/hubsync.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\hubsync\hubsync\data\hubsync.db`
    pub fn new() -> Result<Self> {
        let db_path = Self::default_path()?;
        if let Some(dir) = db_path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path)
    }

    /// Path of the default application database.
    pub fn default_path() -> Result<PathBuf> {
        let project_dirs =
            ProjectDirs::from("dev", "hubsync", "hubsync").ok_or(StoreError::NoDataDir)?;
        Ok(project_dirs.data_dir().join("hubsync.db"))
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::prepare(conn)
    }

    /// Open a private in-memory database (tests, dry runs).
    pub fn open_in_memory() -> Result<Self> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.create_collation(SORT_KEY_COLLATION, compare_sort_keys)?;

        migrations::run_migrations(&conn)?;

        Ok(Self { conn })
    }

    /// Return a reference to the underlying `rusqlite::Connection`.
    ///
    /// Callers should prefer the typed CRUD helpers, but direct access is
    /// occasionally needed for ad-hoc queries.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }

    /// Run `f` inside an immediate transaction.
    ///
    /// The transaction commits when `f` returns `Ok` and rolls back otherwise.
    /// Every reconciliation upsert goes through here so that one upsert call
    /// is one atomic write.
    pub fn in_transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Database) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| E::from(StoreError::Sqlite(e)))?;

        match f(self) {
            Ok(value) => {
                self.conn
                    .execute_batch("COMMIT")
                    .map_err(|e| E::from(StoreError::Sqlite(e)))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.conn.execute_batch("ROLLBACK") {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        let db = Database::open_at(&path).expect("should open");
        assert!(db.path().is_some());

        drop(db);
        Database::open_at(&path).expect("reopen runs migrations idempotently");
    }

    #[test]
    fn sort_key_collation_orders_numerically() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute_batch(
                "CREATE TEMP TABLE keys (k TEXT);
                 INSERT INTO keys VALUES ('100'), ('99'), ('5');",
            )
            .unwrap();

        let mut stmt = db
            .conn()
            .prepare("SELECT k FROM keys ORDER BY k COLLATE SORTKEY ASC")
            .unwrap();
        let keys: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(keys, vec!["5", "99", "100"]);
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute_batch("CREATE TEMP TABLE t (v INTEGER)")
            .unwrap();

        let result: std::result::Result<(), StoreError> = db.in_transaction(|db| {
            db.conn().execute("INSERT INTO t VALUES (1)", [])?;
            Err(StoreError::NotFound)
        });
        assert!(result.is_err());

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
