//! v001 -- Initial schema creation.
//!
//! Creates the mirror tables (`contacts`, `chats`, `messages`,
//! `participants`) and the sync bookkeeping singletons (`sync_state`,
//! `sync_lock`, `backfill_control`).

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Contacts
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS contacts (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    name               TEXT NOT NULL,
    avatar_url         TEXT,
    instagram_username TEXT,                  -- lower-cased, no leading '@'
    phones             TEXT NOT NULL DEFAULT '[]', -- JSON array, original forms
    created_at         TEXT NOT NULL          -- RFC-3339
);

CREATE INDEX IF NOT EXISTS idx_contacts_instagram ON contacts(instagram_username);

-- ----------------------------------------------------------------
-- Chats
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chats (
    chat_id                  TEXT PRIMARY KEY NOT NULL,  -- hub chat id
    local_chat_id            TEXT,
    account_id               TEXT NOT NULL,
    network                  TEXT NOT NULL,
    title                    TEXT NOT NULL,
    chat_type                TEXT NOT NULL,              -- 'single' | 'group'
    username                 TEXT,
    phone                    TEXT,
    email                    TEXT,
    participant_name         TEXT,
    avatar_url               TEXT,
    cannot_message           INTEGER NOT NULL DEFAULT 0,
    unread_count             INTEGER NOT NULL DEFAULT 0,
    is_archived              INTEGER NOT NULL DEFAULT 0,
    is_muted                 INTEGER NOT NULL DEFAULT 0,
    is_pinned                INTEGER NOT NULL DEFAULT 0,
    last_activity            TEXT NOT NULL,
    last_message             TEXT,
    last_message_from        TEXT,                       -- 'user' | 'them'
    needs_reply              INTEGER NOT NULL DEFAULT 0,
    newest_message_sort_key  TEXT,
    oldest_message_sort_key  TEXT,
    has_complete_history     INTEGER NOT NULL DEFAULT 0,
    last_messages_synced_at  TEXT,
    contact_id               INTEGER,
    contact_manually_linked  INTEGER NOT NULL DEFAULT 0,
    created_at               TEXT NOT NULL,
    updated_at               TEXT NOT NULL,

    FOREIGN KEY (contact_id) REFERENCES contacts(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_chats_activity ON chats(last_activity DESC);
CREATE INDEX IF NOT EXISTS idx_chats_contact ON chats(contact_id);

-- ----------------------------------------------------------------
-- Messages (insert-only under sync)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    message_id   TEXT PRIMARY KEY NOT NULL,   -- hub message id
    chat_id      TEXT NOT NULL,
    account_id   TEXT NOT NULL,
    sender_id    TEXT NOT NULL,
    sender_name  TEXT,
    text         TEXT NOT NULL,
    timestamp    TEXT NOT NULL,
    sort_key     TEXT NOT NULL,
    is_from_user INTEGER NOT NULL DEFAULT 0,
    attachments  TEXT NOT NULL DEFAULT '[]',  -- JSON
    reactions    TEXT NOT NULL DEFAULT '[]',  -- JSON

    FOREIGN KEY (chat_id) REFERENCES chats(chat_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_chat_ts ON messages(chat_id, timestamp DESC);

-- ----------------------------------------------------------------
-- Participants
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS participants (
    chat_id        TEXT NOT NULL,
    participant_id TEXT NOT NULL,
    full_name      TEXT,
    username       TEXT,
    phone          TEXT,
    email          TEXT,
    avatar_url     TEXT,
    is_self        INTEGER NOT NULL DEFAULT 0,
    cannot_message INTEGER NOT NULL DEFAULT 0,
    contact_id     INTEGER,

    PRIMARY KEY (chat_id, participant_id),
    FOREIGN KEY (chat_id) REFERENCES chats(chat_id) ON DELETE CASCADE,
    FOREIGN KEY (contact_id) REFERENCES contacts(id) ON DELETE SET NULL
);

-- ----------------------------------------------------------------
-- Sync bookkeeping singletons
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS sync_state (
    id             INTEGER PRIMARY KEY CHECK (id = 1),
    newest_cursor  TEXT,
    oldest_cursor  TEXT,
    last_synced_at TEXT,
    source         TEXT,
    total_chats    INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS sync_lock (
    id          INTEGER PRIMARY KEY CHECK (id = 1),
    holder      TEXT,
    acquired_at TEXT
);

CREATE TABLE IF NOT EXISTS backfill_control (
    id                INTEGER PRIMARY KEY CHECK (id = 1),
    running           INTEGER NOT NULL DEFAULT 0,
    stop_requested    INTEGER NOT NULL DEFAULT 0,
    started_at        TEXT,
    finished_at       TEXT,
    chats_processed   INTEGER NOT NULL DEFAULT 0,
    messages_inserted INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO sync_state (id) VALUES (1);
INSERT OR IGNORE INTO sync_lock (id) VALUES (1);
INSERT OR IGNORE INTO backfill_control (id) VALUES (1);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
