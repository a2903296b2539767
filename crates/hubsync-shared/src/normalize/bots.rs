use crate::constants::DEFAULT_BOT_NAMES;

/// Names of automated pseudo-participants some networks inject into chats.
///
/// Matching is a case-insensitive substring test against a participant's
/// display name and username. The list is data, configured per deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotDenylist {
    needles: Vec<String>,
}

impl BotDenylist {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let needles = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_lowercase())
            .filter(|n| !n.is_empty())
            .collect();
        Self { needles }
    }

    /// Parse a comma separated list, e.g. from an environment variable.
    pub fn from_csv(csv: &str) -> Self {
        Self::new(csv.split(','))
    }

    pub fn empty() -> Self {
        Self {
            needles: Vec::new(),
        }
    }

    pub fn is_bot(&self, name: Option<&str>, username: Option<&str>) -> bool {
        [name, username].into_iter().flatten().any(|value| {
            let value = value.to_lowercase();
            self.needles.iter().any(|needle| value.contains(needle.as_str()))
        })
    }

    pub fn names(&self) -> &[String] {
        &self.needles
    }
}

impl Default for BotDenylist {
    fn default() -> Self {
        Self::new(DEFAULT_BOT_NAMES.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_list_catches_assistant() {
        let bots = BotDenylist::default();
        assert!(bots.is_bot(Some("Meta AI"), None));
        assert!(bots.is_bot(None, Some("meta ai assistant")));
        assert!(!bots.is_bot(Some("Alice"), Some("alice")));
        assert!(!bots.is_bot(None, None));
    }

    #[test]
    fn csv_parsing_skips_blanks() {
        let bots = BotDenylist::from_csv(" Helper Bot, ,Echo ");
        assert_eq!(bots.names(), &["helper bot".to_string(), "echo".to_string()]);
        assert!(bots.is_bot(Some("ECHO service"), None));
    }

    #[test]
    fn empty_list_matches_nothing() {
        assert!(!BotDenylist::empty().is_bot(Some("Meta AI"), None));
    }
}
