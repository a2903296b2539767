use rusqlite::Connection;

// Contacts created before this table existed have no rows here; lookups
// fall back to a scan for them until `reindex_contact_phones` runs.
const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS contact_phones (
    contact_id       INTEGER NOT NULL,
    phone_raw        TEXT NOT NULL,     -- as entered
    phone_normalized TEXT NOT NULL,     -- normalize_phone() output

    PRIMARY KEY (contact_id, phone_raw),
    FOREIGN KEY (contact_id) REFERENCES contacts(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_contact_phones_raw ON contact_phones(phone_raw);
CREATE INDEX IF NOT EXISTS idx_contact_phones_normalized ON contact_phones(phone_normalized);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
