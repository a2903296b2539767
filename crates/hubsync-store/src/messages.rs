use rusqlite::{params, OptionalExtension};

use hubsync_shared::types::MessageStatus;

use crate::database::Database;
use crate::error::Result;
use crate::models::Message;
use crate::sql::{enum_from_sql, json_from_sql, ts_from_sql, ts_to_sql};

const MESSAGE_COLUMNS: &str = "message_id, chat_id, account_id, sender_id, sender_name, text,
     timestamp, sort_key, is_from_user, attachments, reactions, status, error_message";

impl Database {
    /// Insert a message. Fails on a duplicate `message_id`; sync checks
    /// [`Database::message_exists`] first because stored messages are never
    /// patched.
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages (
                message_id, chat_id, account_id, sender_id, sender_name, text,
                timestamp, sort_key, is_from_user, attachments, reactions,
                status, error_message
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                message.message_id,
                message.chat_id,
                message.account_id,
                message.sender_id,
                message.sender_name,
                message.text,
                ts_to_sql(&message.timestamp),
                message.sort_key,
                message.is_from_user,
                serde_json::to_string(&message.attachments)?,
                serde_json::to_string(&message.reactions)?,
                message.status.as_str(),
                message.error_message,
            ],
        )?;
        Ok(())
    }

    pub fn message_exists(&self, message_id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM messages WHERE message_id = ?1",
                params![message_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn find_message(&self, message_id: &str) -> Result<Option<Message>> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE message_id = ?1");
        Ok(self
            .conn()
            .query_row(&sql, params![message_id], row_to_message)
            .optional()?)
    }

    /// The most recent stored message of a chat by sort key.
    pub fn latest_message_for_chat(&self, chat_id: &str) -> Result<Option<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE chat_id = ?1
             ORDER BY sort_key COLLATE SORTKEY DESC
             LIMIT 1"
        );
        Ok(self
            .conn()
            .query_row(&sql, params![chat_id], row_to_message)
            .optional()?)
    }

    /// Messages of a chat, newest first, optionally strictly older than
    /// `before_sort_key`.
    pub fn list_messages_for_chat(
        &self,
        chat_id: &str,
        limit: u32,
        before_sort_key: Option<&str>,
    ) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE chat_id = ?1
               AND (?2 IS NULL OR sort_key < ?2 COLLATE SORTKEY)
             ORDER BY sort_key COLLATE SORTKEY DESC
             LIMIT ?3"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![chat_id, before_sort_key, limit], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn count_messages_for_chat(&self, chat_id: &str) -> Result<i64> {
        Ok(self.conn().query_row(
            "SELECT COUNT(*) FROM messages WHERE chat_id = ?1",
            params![chat_id],
            |row| row.get(0),
        )?)
    }

    /// Record the delivery state of a locally sent message.
    pub fn set_message_status(
        &self,
        message_id: &str,
        status: MessageStatus,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET status = ?2, error_message = ?3 WHERE message_id = ?1",
            params![message_id, status.as_str(), error_message],
        )?;
        Ok(affected > 0)
    }

    /// Swap a synthetic local id for the id assigned by the hub.
    pub fn rename_message(&self, old_id: &str, new_id: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET message_id = ?2 WHERE message_id = ?1",
            params![old_id, new_id],
        )?;
        Ok(affected > 0)
    }

    pub fn delete_message(&self, message_id: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM messages WHERE message_id = ?1",
            params![message_id],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let timestamp: String = row.get(6)?;
    let attachments: String = row.get(9)?;
    let reactions: String = row.get(10)?;
    let status: String = row.get(11)?;

    Ok(Message {
        message_id: row.get(0)?,
        chat_id: row.get(1)?,
        account_id: row.get(2)?,
        sender_id: row.get(3)?,
        sender_name: row.get(4)?,
        text: row.get(5)?,
        timestamp: ts_from_sql(6, &timestamp)?,
        sort_key: row.get(7)?,
        is_from_user: row.get(8)?,
        attachments: json_from_sql(9, &attachments)?,
        reactions: json_from_sql(10, &reactions)?,
        status: enum_from_sql(11, &status)?,
        error_message: row.get(12)?,
    })
}
