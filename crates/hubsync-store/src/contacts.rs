//! Contacts and the phone lookup index.
//!
//! Each contact's phone numbers are mirrored into `contact_phones` in both
//! their original and normalized form, so matching a chat to a contact is an
//! indexed lookup instead of normalizing every stored number at runtime.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use hubsync_shared::normalize::{normalize_handle, normalize_phone, PhoneRules};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Contact, NewContact};
use crate::sql::{json_from_sql, not_found, ts_from_sql, ts_to_sql};

const CONTACT_COLUMNS: &str = "id, name, avatar_url, instagram_username, phones, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a contact and index its phone numbers.
    pub fn insert_contact(&self, new: &NewContact, rules: &PhoneRules) -> Result<Contact> {
        let created_at = Utc::now();
        let instagram = new.instagram_username.as_deref().and_then(normalize_handle);
        let phones: Vec<String> = new
            .phones
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        let id = self.in_transaction(|db| -> Result<i64> {
            db.conn().execute(
                "INSERT INTO contacts (name, avatar_url, instagram_username, phones, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    new.name,
                    new.avatar_url,
                    instagram,
                    serde_json::to_string(&phones)?,
                    ts_to_sql(&created_at),
                ],
            )?;
            let id = db.conn().last_insert_rowid();
            db.index_phones(id, &phones, rules)?;
            Ok(id)
        })?;

        tracing::debug!(contact_id = id, phones = phones.len(), "contact created");
        self.get_contact(id)
    }

    fn index_phones(&self, contact_id: i64, phones: &[String], rules: &PhoneRules) -> Result<()> {
        let mut stmt = self.conn().prepare(
            "INSERT OR REPLACE INTO contact_phones (contact_id, phone_raw, phone_normalized)
             VALUES (?1, ?2, ?3)",
        )?;
        for phone in phones {
            let normalized = normalize_phone(phone, rules);
            if normalized.is_empty() {
                continue;
            }
            stmt.execute(params![contact_id, phone, normalized])?;
        }
        Ok(())
    }

    /// Build index rows for contacts stored before the index existed.
    /// Returns the number of contacts indexed.
    pub fn reindex_contact_phones(&self, rules: &PhoneRules) -> Result<usize> {
        let legacy = self.list_unindexed_contacts()?;
        for contact in &legacy {
            self.index_phones(contact.id, &contact.phones, rules)?;
        }
        if !legacy.is_empty() {
            tracing::info!(count = legacy.len(), "indexed legacy contact phones");
        }
        Ok(legacy.len())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_contact(&self, id: i64) -> Result<Contact> {
        let sql = format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1");
        let mut contact = self
            .conn()
            .query_row(&sql, params![id], row_to_contact)
            .map_err(not_found)?;
        contact.normalized_phones = self.normalized_phones_of(id)?;
        Ok(contact)
    }

    pub fn list_contacts(&self) -> Result<Vec<Contact>> {
        let sql = format!("SELECT {CONTACT_COLUMNS} FROM contacts ORDER BY name ASC, id ASC");
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map([], row_to_contact)?;

        let mut contacts = Vec::new();
        for row in rows {
            let mut contact = row?;
            contact.normalized_phones = self.normalized_phones_of(contact.id)?;
            contacts.push(contact);
        }
        Ok(contacts)
    }

    fn normalized_phones_of(&self, contact_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn().prepare(
            "SELECT DISTINCT phone_normalized FROM contact_phones
             WHERE contact_id = ?1 ORDER BY phone_normalized",
        )?;
        let rows = stmt.query_map(params![contact_id], |row| row.get(0))?;
        let mut phones = Vec::new();
        for row in rows {
            phones.push(row?);
        }
        Ok(phones)
    }

    /// Contact whose Instagram handle equals `handle` (canonicalized).
    pub fn find_contact_by_instagram(&self, handle: &str) -> Result<Option<i64>> {
        let Some(handle) = normalize_handle(handle) else {
            return Ok(None);
        };
        Ok(self
            .conn()
            .query_row(
                "SELECT id FROM contacts WHERE instagram_username = ?1 ORDER BY id LIMIT 1",
                params![handle],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Contact holding `phone` exactly as entered.
    pub fn find_contact_by_phone(&self, phone: &str) -> Result<Option<i64>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT contact_id FROM contact_phones WHERE phone_raw = ?1
                 ORDER BY contact_id LIMIT 1",
                params![phone.trim()],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Contact whose normalized phone set contains `normalized`.
    pub fn find_contact_by_normalized_phone(&self, normalized: &str) -> Result<Option<i64>> {
        if normalized.is_empty() {
            return Ok(None);
        }
        Ok(self
            .conn()
            .query_row(
                "SELECT contact_id FROM contact_phones WHERE phone_normalized = ?1
                 ORDER BY contact_id LIMIT 1",
                params![normalized],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Contacts that have phone numbers but no index rows.
    ///
    /// Only the legacy fallback path and [`Database::reindex_contact_phones`]
    /// read this.
    pub fn list_unindexed_contacts(&self) -> Result<Vec<Contact>> {
        let sql = format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts c
             WHERE c.phones != '[]'
               AND NOT EXISTS (SELECT 1 FROM contact_phones p WHERE p.contact_id = c.id)
             ORDER BY c.id"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map([], row_to_contact)?;

        let mut contacts = Vec::new();
        for row in rows {
            contacts.push(row?);
        }
        Ok(contacts)
    }

    pub fn contact_exists(&self, id: i64) -> Result<bool> {
        match self.get_contact(id) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn row_to_contact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
    let phones: String = row.get(4)?;
    let created_at: String = row.get(5)?;

    Ok(Contact {
        id: row.get(0)?,
        name: row.get(1)?,
        avatar_url: row.get(2)?,
        instagram_username: row.get(3)?,
        phones: json_from_sql(4, &phones)?,
        normalized_phones: Vec::new(),
        created_at: ts_from_sql(5, &created_at)?,
    })
}
