//! CRUD operations for [`Chat`] records.

use rusqlite::{params, OptionalExtension};

use hubsync_shared::types::ChatFilter;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Chat, ChatSummary};
use crate::sql::{enum_from_sql, not_found, opt_ts_from_sql, opt_ts_to_sql, ts_from_sql, ts_to_sql};

const CHAT_COLUMNS: &str = "c.chat_id, c.local_chat_id, c.account_id, c.network, c.title, c.chat_type,
     c.username, c.phone, c.email, c.participant_name, c.avatar_url, c.cannot_message,
     c.unread_count, c.is_archived, c.is_muted, c.is_pinned, c.last_activity,
     c.last_message, c.last_message_from, c.needs_reply,
     c.newest_message_sort_key, c.oldest_message_sort_key, c.has_complete_history,
     c.last_messages_synced_at, c.contact_id, c.contact_manually_linked,
     c.created_at, c.updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Create / update
    // ------------------------------------------------------------------

    /// Insert a chat seen for the first time.
    pub fn insert_chat(&self, chat: &Chat) -> Result<()> {
        self.conn().execute(
            "INSERT INTO chats (
                chat_id, local_chat_id, account_id, network, title, chat_type,
                username, phone, email, participant_name, avatar_url, cannot_message,
                unread_count, is_archived, is_muted, is_pinned, last_activity,
                last_message, last_message_from, needs_reply,
                newest_message_sort_key, oldest_message_sort_key, has_complete_history,
                last_messages_synced_at, contact_id, contact_manually_linked,
                created_at, updated_at
             ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28
             )",
            params![
                chat.chat_id,
                chat.local_chat_id,
                chat.account_id,
                chat.network,
                chat.title,
                chat.chat_type.as_str(),
                chat.username,
                chat.phone,
                chat.email,
                chat.participant_name,
                chat.avatar_url,
                chat.cannot_message,
                chat.unread_count,
                chat.is_archived,
                chat.is_muted,
                chat.is_pinned,
                ts_to_sql(&chat.last_activity),
                chat.last_message,
                chat.last_message_from.map(|s| s.as_str()),
                chat.needs_reply,
                chat.newest_message_sort_key,
                chat.oldest_message_sort_key,
                chat.has_complete_history,
                opt_ts_to_sql(chat.last_messages_synced_at.as_ref()),
                chat.contact_id,
                chat.contact_manually_linked,
                ts_to_sql(&chat.created_at),
                ts_to_sql(&chat.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Overwrite every mutable column of an existing chat.
    ///
    /// `chat_id` and `created_at` are never rewritten.
    pub fn update_chat(&self, chat: &Chat) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE chats SET
                local_chat_id = ?2, account_id = ?3, network = ?4, title = ?5, chat_type = ?6,
                username = ?7, phone = ?8, email = ?9, participant_name = ?10,
                avatar_url = ?11, cannot_message = ?12, unread_count = ?13,
                is_archived = ?14, is_muted = ?15, is_pinned = ?16, last_activity = ?17,
                last_message = ?18, last_message_from = ?19, needs_reply = ?20,
                newest_message_sort_key = ?21, oldest_message_sort_key = ?22,
                has_complete_history = ?23, last_messages_synced_at = ?24,
                contact_id = ?25, contact_manually_linked = ?26, updated_at = ?27
             WHERE chat_id = ?1",
            params![
                chat.chat_id,
                chat.local_chat_id,
                chat.account_id,
                chat.network,
                chat.title,
                chat.chat_type.as_str(),
                chat.username,
                chat.phone,
                chat.email,
                chat.participant_name,
                chat.avatar_url,
                chat.cannot_message,
                chat.unread_count,
                chat.is_archived,
                chat.is_muted,
                chat.is_pinned,
                ts_to_sql(&chat.last_activity),
                chat.last_message,
                chat.last_message_from.map(|s| s.as_str()),
                chat.needs_reply,
                chat.newest_message_sort_key,
                chat.oldest_message_sort_key,
                chat.has_complete_history,
                opt_ts_to_sql(chat.last_messages_synced_at.as_ref()),
                chat.contact_id,
                chat.contact_manually_linked,
                ts_to_sql(&chat.updated_at),
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Link (or unlink, with `None`) a chat to a contact.
    ///
    /// `manual` marks the link as user-chosen so auto-matching leaves it
    /// alone; unlinking by hand also pins the empty link.
    pub fn set_chat_contact(&self, chat_id: &str, contact_id: Option<i64>, manual: bool) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE chats SET contact_id = ?2, contact_manually_linked = ?3 WHERE chat_id = ?1",
            params![chat_id, contact_id, manual],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a chat by hub identifier, `None` if never synced.
    pub fn find_chat(&self, chat_id: &str) -> Result<Option<Chat>> {
        let sql = format!("SELECT {CHAT_COLUMNS} FROM chats c WHERE c.chat_id = ?1");
        Ok(self
            .conn()
            .query_row(&sql, params![chat_id], row_to_chat)
            .optional()?)
    }

    /// Fetch a chat by hub identifier.
    pub fn get_chat(&self, chat_id: &str) -> Result<Chat> {
        let sql = format!("SELECT {CHAT_COLUMNS} FROM chats c WHERE c.chat_id = ?1");
        self.conn()
            .query_row(&sql, params![chat_id], row_to_chat)
            .map_err(not_found)
    }

    /// Page through chats by most recent activity, joined with their contact.
    pub fn list_chat_summaries(
        &self,
        filter: ChatFilter,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ChatSummary>> {
        let predicate = match filter {
            ChatFilter::Unreplied => "c.is_archived = 0 AND c.needs_reply = 1",
            ChatFilter::Unread => "c.is_archived = 0 AND c.unread_count > 0",
            ChatFilter::All => "c.is_archived = 0",
            ChatFilter::Archived => "c.is_archived = 1",
        };
        let sql = format!(
            "SELECT {CHAT_COLUMNS}, k.name, k.avatar_url
             FROM chats c
             LEFT JOIN contacts k ON k.id = c.contact_id
             WHERE {predicate}
             ORDER BY c.last_activity DESC, c.chat_id ASC
             LIMIT ?1 OFFSET ?2"
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![limit, offset], |row| {
            Ok(ChatSummary {
                chat: row_to_chat(row)?,
                contact_name: row.get(28)?,
                contact_avatar_url: row.get(29)?,
            })
        })?;

        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }

    /// Chats whose backward message history has not been exhausted yet,
    /// most recently active first.
    pub fn list_chats_missing_history(&self, limit: u32) -> Result<Vec<Chat>> {
        let sql = format!(
            "SELECT {CHAT_COLUMNS} FROM chats c
             WHERE c.has_complete_history = 0
             ORDER BY c.last_activity DESC
             LIMIT ?1"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![limit], row_to_chat)?;

        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }

    pub fn count_chats(&self) -> Result<i64> {
        Ok(self
            .conn()
            .query_row("SELECT COUNT(*) FROM chats", [], |row| row.get(0))?)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` (selected with `CHAT_COLUMNS`) to a [`Chat`].
fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    let chat_type: String = row.get(5)?;
    let last_activity: String = row.get(16)?;
    let last_message_from: Option<String> = row.get(18)?;
    let synced_at: Option<String> = row.get(23)?;
    let created_at: String = row.get(26)?;
    let updated_at: String = row.get(27)?;

    Ok(Chat {
        chat_id: row.get(0)?,
        local_chat_id: row.get(1)?,
        account_id: row.get(2)?,
        network: row.get(3)?,
        title: row.get(4)?,
        chat_type: enum_from_sql(5, &chat_type)?,
        username: row.get(6)?,
        phone: row.get(7)?,
        email: row.get(8)?,
        participant_name: row.get(9)?,
        avatar_url: row.get(10)?,
        cannot_message: row.get(11)?,
        unread_count: row.get(12)?,
        is_archived: row.get(13)?,
        is_muted: row.get(14)?,
        is_pinned: row.get(15)?,
        last_activity: ts_from_sql(16, &last_activity)?,
        last_message: row.get(17)?,
        last_message_from: last_message_from
            .map(|s| enum_from_sql(18, &s))
            .transpose()?,
        needs_reply: row.get(19)?,
        newest_message_sort_key: row.get(20)?,
        oldest_message_sort_key: row.get(21)?,
        has_complete_history: row.get(22)?,
        last_messages_synced_at: opt_ts_from_sql(23, synced_at)?,
        contact_id: row.get(24)?,
        contact_manually_linked: row.get(25)?,
        created_at: ts_from_sql(26, &created_at)?,
        updated_at: ts_from_sql(27, &updated_at)?,
    })
}
