/// Minimum digit count before a name is treated as a formatted phone number.
const PHONE_LIKE_MIN_DIGITS: usize = 6;

const PHONE_PUNCTUATION: &[char] = &['+', '-', '(', ')', '.'];

/// `true` when a display name looks like a raw network identifier rather
/// than a human name: a matrix/email style handle (`@user:server`,
/// `user@host`) or a mostly-digit phone number.
pub fn looks_like_raw_identifier(name: &str) -> bool {
    let name = name.trim();
    if name.is_empty() {
        return true;
    }
    if name.contains('@') || name.contains(':') {
        return true;
    }

    let digits = name.chars().filter(|c| c.is_ascii_digit()).count();
    let significant = name
        .chars()
        .filter(|c| !c.is_whitespace() && !PHONE_PUNCTUATION.contains(c))
        .count();
    digits >= PHONE_LIKE_MIN_DIGITS && digits * 10 >= significant * 8
}

/// Decide whether `incoming` should replace `existing` as a display name.
///
/// A good name is never replaced by a raw identifier; every other real
/// change (raw to good, good to good, raw to raw) counts.
pub fn is_name_improvement(existing: Option<&str>, incoming: Option<&str>) -> bool {
    let incoming = match incoming.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return false,
    };
    let existing = match existing.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return true,
    };
    if existing == incoming {
        return false;
    }

    !(looks_like_raw_identifier(incoming) && !looks_like_raw_identifier(existing))
}

/// The name that should be stored after seeing `incoming`.
pub fn pick_display_name(existing: Option<&str>, incoming: Option<&str>) -> Option<String> {
    if is_name_improvement(existing, incoming) {
        incoming.map(|s| s.trim().to_string())
    } else {
        existing.map(str::to_string)
    }
}

/// Canonical form of a social handle: trimmed, no leading `@`, lower-cased.
pub fn normalize_handle(raw: &str) -> Option<String> {
    let handle = raw.trim().trim_start_matches('@').trim();
    if handle.is_empty() {
        None
    } else {
        Some(handle.to_lowercase())
    }
}
