use chrono::{DateTime, Utc};
use serde::Serialize;

use hubsync_shared::normalize::{pick_display_name, BotDenylist, PhoneRules};
use hubsync_shared::types::ChatType;
use hubsync_store::{Database, Result};

use super::contacts::resolve_contact;
use crate::normalize::NormalizedParticipant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantUpsertOutcome {
    /// Participant rows inserted or changed.
    pub written: usize,
    /// Missing chat fields were filled from the counterpart.
    pub chat_backfilled: bool,
}

/// Upsert the participants of one chat.
///
/// Unchanged rows are not rewritten. For single chats, the first non-self
/// non-bot participant fills chat fields the chat list left empty.
pub fn upsert_participants(
    db: &Database,
    chat_id: &str,
    participants: &[NormalizedParticipant],
    bots: &BotDenylist,
    rules: &PhoneRules,
    now: DateTime<Utc>,
) -> Result<ParticipantUpsertOutcome> {
    db.in_transaction(|db| {
        let mut outcome = ParticipantUpsertOutcome::default();
        let mut counterpart: Option<(&NormalizedParticipant, Option<i64>)> = None;

        for participant in participants {
            let existing = db.find_participant(chat_id, &participant.participant_id)?;
            let contact_id = if participant.is_self {
                None
            } else {
                resolve_contact(
                    db,
                    participant.username.as_deref(),
                    participant.phone.as_deref(),
                    rules,
                )?
                .or_else(|| existing.as_ref().and_then(|p| p.contact_id))
            };

            let record = participant.to_participant(chat_id, contact_id);
            if existing.as_ref() != Some(&record) {
                db.upsert_participant(&record)?;
                outcome.written += 1;
            }

            if counterpart.is_none()
                && !participant.is_self
                && !bots.is_bot(participant.full_name.as_deref(), participant.username.as_deref())
            {
                counterpart = Some((participant, contact_id));
            }
        }

        let Some((p, contact_id)) = counterpart else {
            return Ok(outcome);
        };
        let mut chat = db.get_chat(chat_id)?;
        if chat.chat_type != ChatType::Single {
            return Ok(outcome);
        }

        let mut changed = false;
        fill(&mut chat.phone, &p.phone, &mut changed);
        fill(&mut chat.username, &p.username, &mut changed);
        fill(&mut chat.email, &p.email, &mut changed);
        fill(&mut chat.avatar_url, &p.avatar_url, &mut changed);
        let picked = pick_display_name(chat.participant_name.as_deref(), p.full_name.as_deref());
        if picked != chat.participant_name {
            chat.participant_name = picked;
            changed = true;
        }
        if chat.contact_id.is_none() && !chat.contact_manually_linked && contact_id.is_some() {
            chat.contact_id = contact_id;
            changed = true;
        }

        if changed {
            chat.updated_at = now;
            db.update_chat(&chat)?;
            outcome.chat_backfilled = true;
        }
        Ok(outcome)
    })
}

fn fill(slot: &mut Option<String>, value: &Option<String>, changed: &mut bool) {
    if slot.is_none() && value.is_some() {
        *slot = value.clone();
        *changed = true;
    }
}

#[cfg(test)]
mod tests {
    use hubsync_store::NewContact;

    use super::*;
    use crate::normalize::normalize_participant;
    use crate::reconcile::upsert_chat;
    use crate::testing::{normalized_chat, raw_participant, t0};

    fn participant(id: &str, name: &str, is_self: bool) -> NormalizedParticipant {
        normalize_participant(&raw_participant(id, name, is_self)).unwrap()
    }

    #[test]
    fn counterpart_fills_missing_chat_fields() {
        let db = Database::open_in_memory().unwrap();
        let contact = db
            .insert_contact(
                &NewContact {
                    name: "Carol".into(),
                    instagram_username: Some("carol".into()),
                    ..Default::default()
                },
                &PhoneRules::default(),
            )
            .unwrap();

        let mut chat = normalized_chat("!a", 0);
        chat.counterpart = None;
        upsert_chat(&db, &chat, &PhoneRules::default(), t0()).unwrap();

        let bot = participant("@meta", "Meta AI", false);
        let mut carol = participant("@carol", "Carol", false);
        carol.username = Some("carol".into());
        carol.phone = Some("+66812345678".into());
        let me = participant("@me", "Me", true);

        let outcome = upsert_participants(
            &db,
            "!a",
            &[me, bot, carol],
            &BotDenylist::default(),
            &PhoneRules::default(),
            t0(),
        )
        .unwrap();
        assert_eq!(outcome.written, 3);
        assert!(outcome.chat_backfilled);

        let stored = db.get_chat("!a").unwrap();
        assert_eq!(stored.username.as_deref(), Some("carol"));
        assert_eq!(stored.phone.as_deref(), Some("+66812345678"));
        assert_eq!(stored.participant_name.as_deref(), Some("Carol"));
        assert_eq!(stored.contact_id, Some(contact.id));

        let participants = db.list_participants("!a").unwrap();
        let carol_row = participants
            .iter()
            .find(|p| p.participant_id == "@carol")
            .unwrap();
        assert_eq!(carol_row.contact_id, Some(contact.id));
    }

    #[test]
    fn unchanged_participants_are_not_rewritten() {
        let db = Database::open_in_memory().unwrap();
        upsert_chat(&db, &normalized_chat("!a", 0), &PhoneRules::default(), t0()).unwrap();
        let list = vec![participant("@bob", "Bob", false), participant("@me", "Me", true)];

        let first = upsert_participants(
            &db,
            "!a",
            &list,
            &BotDenylist::default(),
            &PhoneRules::default(),
            t0(),
        )
        .unwrap();
        assert_eq!(first.written, 2);

        let second = upsert_participants(
            &db,
            "!a",
            &list,
            &BotDenylist::default(),
            &PhoneRules::default(),
            t0(),
        )
        .unwrap();
        assert_eq!(second, ParticipantUpsertOutcome::default());
    }
}
