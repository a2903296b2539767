//! CRUD operations for [`Participant`] records.

use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;
use crate::models::Participant;

const PARTICIPANT_COLUMNS: &str = "chat_id, participant_id, full_name, username, phone, email,
     avatar_url, is_self, cannot_message, contact_id";

impl Database {
    /// Insert or overwrite the record for `(chat_id, participant_id)`.
    pub fn upsert_participant(&self, participant: &Participant) -> Result<()> {
        self.conn().execute(
            "INSERT INTO participants (
                chat_id, participant_id, full_name, username, phone, email,
                avatar_url, is_self, cannot_message, contact_id
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(chat_id, participant_id) DO UPDATE SET
                full_name = excluded.full_name,
                username = excluded.username,
                phone = excluded.phone,
                email = excluded.email,
                avatar_url = excluded.avatar_url,
                is_self = excluded.is_self,
                cannot_message = excluded.cannot_message,
                contact_id = excluded.contact_id",
            params![
                participant.chat_id,
                participant.participant_id,
                participant.full_name,
                participant.username,
                participant.phone,
                participant.email,
                participant.avatar_url,
                participant.is_self,
                participant.cannot_message,
                participant.contact_id,
            ],
        )?;
        Ok(())
    }

    pub fn find_participant(&self, chat_id: &str, participant_id: &str) -> Result<Option<Participant>> {
        let sql = format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants
             WHERE chat_id = ?1 AND participant_id = ?2"
        );
        Ok(self
            .conn()
            .query_row(&sql, params![chat_id, participant_id], row_to_participant)
            .optional()?)
    }

    /// Participants of a chat, the local user last.
    pub fn list_participants(&self, chat_id: &str) -> Result<Vec<Participant>> {
        let sql = format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants
             WHERE chat_id = ?1
             ORDER BY is_self ASC, participant_id ASC"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![chat_id], row_to_participant)?;

        let mut participants = Vec::new();
        for row in rows {
            participants.push(row?);
        }
        Ok(participants)
    }
}

fn row_to_participant(row: &rusqlite::Row<'_>) -> rusqlite::Result<Participant> {
    Ok(Participant {
        chat_id: row.get(0)?,
        participant_id: row.get(1)?,
        full_name: row.get(2)?,
        username: row.get(3)?,
        phone: row.get(4)?,
        email: row.get(5)?,
        avatar_url: row.get(6)?,
        is_self: row.get(7)?,
        cannot_message: row.get(8)?,
        contact_id: row.get(9)?,
    })
}
