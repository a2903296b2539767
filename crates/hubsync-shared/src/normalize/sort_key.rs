use std::cmp::Ordering;

/// Compare two opaque sort keys.
///
/// Keys that both parse as numbers are compared numerically, so `"99"` sorts
/// before `"100"` and timestamp-like keys compare correctly against short
/// sequence numbers. Anything else falls back to lexical ordering.
pub fn compare_sort_keys(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.trim(), b.trim());

    if let (Some(x), Some(y)) = (parse_integer(a), parse_integer(b)) {
        return compare_integers(x, y);
    }

    if let (Some(x), Some(y)) = (parse_float(a), parse_float(b)) {
        if let Some(ord) = x.partial_cmp(&y) {
            return ord;
        }
    }

    a.cmp(b)
}

/// `true` when `candidate` sorts strictly before `reference`.
pub fn is_sort_key_older(candidate: &str, reference: &str) -> bool {
    compare_sort_keys(candidate, reference) == Ordering::Less
}

/// Sign and magnitude digits (leading zeros stripped) of an integer literal.
struct Integer<'a> {
    negative: bool,
    digits: &'a str,
}

fn parse_integer(s: &str) -> Option<Integer<'_>> {
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    if body.is_empty() || !body.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let digits = body.trim_start_matches('0');
    Some(Integer {
        negative: negative && !digits.is_empty(),
        digits,
    })
}

fn compare_integers(a: Integer<'_>, b: Integer<'_>) -> Ordering {
    match (a.negative, b.negative) {
        (false, true) => Ordering::Greater,
        (true, false) => Ordering::Less,
        (negative, _) => {
            let magnitude = a
                .digits
                .len()
                .cmp(&b.digits.len())
                .then_with(|| a.digits.cmp(b.digits));
            if negative {
                magnitude.reverse()
            } else {
                magnitude
            }
        }
    }
}

fn parse_float(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}
