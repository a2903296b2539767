use crate::constants::DEFAULT_PHONE_COUNTRY_CODE;

/// Regional rules applied by [`normalize_phone`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneRules {
    /// Country calling code prepended to national numbers (digits only).
    pub country_code: String,
    /// Trunk prefix dialled before national numbers.
    pub trunk_prefix: char,
    /// Length of a national subscriber number without trunk prefix.
    pub subscriber_len: usize,
}

impl Default for PhoneRules {
    fn default() -> Self {
        Self {
            country_code: DEFAULT_PHONE_COUNTRY_CODE.to_string(),
            trunk_prefix: '0',
            subscriber_len: 9,
        }
    }
}

impl PhoneRules {
    pub fn with_country_code(country_code: impl Into<String>) -> Self {
        let digits: String = country_code
            .into()
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();
        Self {
            country_code: digits,
            ..Self::default()
        }
    }

    fn international_len(&self) -> usize {
        self.country_code.len() + self.subscriber_len
    }
}

/// Normalize a phone number to a canonical digit string.
///
/// Formatting is stripped, leading `00` international prefixes are removed,
/// and national numbers (trunk-prefixed or bare subscriber numbers) gain the
/// country code. The result is a fixed point: normalizing it again returns
/// the same string.
pub fn normalize_phone(raw: &str, rules: &PhoneRules) -> String {
    let mut digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    while digits.starts_with("00") && digits.len() > rules.international_len() {
        digits.drain(..2);
    }

    if rules.country_code.is_empty() || rules.country_code.starts_with(rules.trunk_prefix) {
        return digits;
    }

    let national_len = rules.subscriber_len + 1;
    if digits.len() == national_len && digits.starts_with(rules.trunk_prefix) {
        return format!("{}{}", rules.country_code, &digits[1..]);
    }

    if digits.len() == rules.subscriber_len && !digits.starts_with(rules.trunk_prefix) {
        return format!("{}{}", rules.country_code, digits);
    }

    digits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(raw: &str) -> String {
        normalize_phone(raw, &PhoneRules::default())
    }

    #[test]
    fn strips_formatting() {
        assert_eq!(norm("+66 (81) 234-5678"), "66812345678");
    }

    #[test]
    fn equivalent_formats_converge() {
        let expected = "66812345678";
        assert_eq!(norm("081-234-5678"), expected);
        assert_eq!(norm("812345678"), expected);
        assert_eq!(norm("+66812345678"), expected);
        assert_eq!(norm("0066 81 234 5678"), expected);
    }

    #[test]
    fn foreign_numbers_keep_their_digits() {
        assert_eq!(norm("+1 (415) 555-0100"), "14155550100");
        assert_eq!(norm("+44 7700 900123"), "447700900123");
    }

    #[test]
    fn empty_and_garbage_input() {
        assert_eq!(norm(""), "");
        assert_eq!(norm("n/a"), "");
    }

    #[test]
    fn normalization_is_idempotent() {
        let samples = [
            "",
            "0",
            "00",
            "0812345678",
            "812345678",
            "012345678",
            "1234567890",
            "+66 81 234 5678",
            "0066812345678",
            "000066812345678",
            "00000000000000",
            "0000812345678",
            "+1 415 555 0100",
            "00 1 415 555 0100",
            "(02) 123 4567",
            "phone: 081.234.5678 ext 9",
        ];
        for raw in samples {
            let once = norm(raw);
            assert_eq!(norm(&once), once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn custom_country_code() {
        let rules = PhoneRules::with_country_code("+49");
        assert_eq!(normalize_phone("0151 234 567", &rules), "49151234567");
        assert_eq!(normalize_phone("151234567", &rules), "49151234567");
    }
}
