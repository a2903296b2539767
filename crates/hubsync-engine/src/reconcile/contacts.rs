use tracing::debug;

use hubsync_shared::normalize::{normalize_phone, PhoneRules};
use hubsync_store::{Database, Result};

/// Find the contact a chat or participant belongs to.
///
/// Precedence: exact Instagram handle, exact phone, normalized phone via
/// the `contact_phones` index. Contacts stored before the index existed
/// are scanned last.
pub fn resolve_contact(
    db: &Database,
    username: Option<&str>,
    phone: Option<&str>,
    rules: &PhoneRules,
) -> Result<Option<i64>> {
    if let Some(handle) = username {
        if let Some(id) = db.find_contact_by_instagram(handle)? {
            return Ok(Some(id));
        }
    }

    let Some(phone) = phone.map(str::trim).filter(|p| !p.is_empty()) else {
        return Ok(None);
    };
    if let Some(id) = db.find_contact_by_phone(phone)? {
        return Ok(Some(id));
    }

    let normalized = normalize_phone(phone, rules);
    if normalized.is_empty() {
        return Ok(None);
    }
    if let Some(id) = db.find_contact_by_normalized_phone(&normalized)? {
        return Ok(Some(id));
    }

    legacy_phone_scan(db, &normalized, rules)
}

/// Fallback for unindexed legacy contacts: normalize each stored number and
/// compare. Empty once `reindex_contact_phones` has run.
fn legacy_phone_scan(db: &Database, normalized: &str, rules: &PhoneRules) -> Result<Option<i64>> {
    for contact in db.list_unindexed_contacts()? {
        if contact
            .phones
            .iter()
            .any(|p| normalize_phone(p, rules) == normalized)
        {
            debug!(contact_id = contact.id, "contact matched by legacy phone scan");
            return Ok(Some(contact.id));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use hubsync_store::NewContact;

    use super::*;

    fn contact(db: &Database, name: &str, instagram: Option<&str>, phones: &[&str]) -> i64 {
        db.insert_contact(
            &NewContact {
                name: name.into(),
                avatar_url: None,
                instagram_username: instagram.map(str::to_string),
                phones: phones.iter().map(|p| p.to_string()).collect(),
            },
            &PhoneRules::default(),
        )
        .unwrap()
        .id
    }

    #[test]
    fn handle_wins_over_phone() {
        let db = Database::open_in_memory().unwrap();
        let by_phone = contact(&db, "Phone", None, &["0812345678"]);
        let by_handle = contact(&db, "Handle", Some("alice"), &[]);
        let rules = PhoneRules::default();

        assert_eq!(
            resolve_contact(&db, Some("@Alice"), Some("0812345678"), &rules).unwrap(),
            Some(by_handle)
        );
        assert_eq!(
            resolve_contact(&db, Some("nobody"), Some("+66 81 234 5678"), &rules).unwrap(),
            Some(by_phone)
        );
        assert_eq!(resolve_contact(&db, None, Some("  "), &rules).unwrap(), None);
        assert_eq!(resolve_contact(&db, None, None, &rules).unwrap(), None);
    }

    #[test]
    fn legacy_contacts_are_scanned() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute(
                "INSERT INTO contacts (name, phones, created_at)
                 VALUES ('Legacy', '[\"081 234 5678\"]', '2024-01-01T00:00:00.000Z')",
                [],
            )
            .unwrap();

        let found = resolve_contact(&db, None, Some("+66812345678"), &PhoneRules::default()).unwrap();
        assert!(found.is_some());
    }
}
