//! Service name helpers: label truncation and collision renaming.

/// Longest DNS label, in bytes, a service instance name may occupy.
pub const LABEL_MAX: usize = 63;

/// Truncates `s` to at most `max` bytes without splitting a UTF-8 sequence.
pub fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }

    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Name of the main server record: `user@host`.
pub fn server_service_name(user: &str, host: &str) -> String {
    truncate_utf8(&format!("{}@{}", user, host), LABEL_MAX).to_string()
}

/// Name of an endpoint record: `user@host: label`.
pub fn endpoint_service_name(user: &str, host: &str, label: &str) -> String {
    truncate_utf8(&format!("{}@{}: {}", user, host, label), LABEL_MAX).to_string()
}

/// Derives the next candidate name after a collision.
///
/// `"name"` becomes `"name #2"`, `"name #2"` becomes `"name #3"` and so on.
/// The base is shortened when needed so the suffix always fits inside a
/// label, which keeps every candidate distinct from the one before it.
pub fn alternative_service_name(name: &str) -> String {
    // A counter too large to bump starts a fresh suffix
    let (base, next) = split_counter(name)
        .and_then(|(base, n)| n.checked_add(1).map(|next| (base, next)))
        .unwrap_or((name, 2));

    let suffix = format!(" #{}", next);
    let base = truncate_utf8(base, LABEL_MAX.saturating_sub(suffix.len()));
    format!("{}{}", base, suffix)
}

/// Splits `"base #N"` into `("base", N)`.
fn split_counter(name: &str) -> Option<(&str, u64)> {
    let (base, digits) = name.rsplit_once(" #")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) || digits.starts_with('0') {
        return None;
    }
    digits.parse().ok().map(|n| (base, n))
}
