use rusqlite::Connection;

const UP_SQL: &str = r#"
-- Optimistic sends: delivery state and last failure text
ALTER TABLE messages ADD COLUMN status TEXT NOT NULL DEFAULT 'sent';
ALTER TABLE messages ADD COLUMN error_message TEXT;

CREATE INDEX IF NOT EXISTS idx_messages_status ON messages(status) WHERE status != 'sent';
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
