//! Identifier generation shared by every domain type.
//!
//! Ids are hex-prefixed slugs: an 8-character hex prefix derived from a fresh
//! UUIDv7 (time-ordered, so ids sort roughly by creation order) followed by a
//! short slug of the given label.

use uuid::Uuid;

/// Generate an id of the form `<prefix>-<kind>-<slug>`.
///
/// `kind` is a short noun identifying the domain type (`task`, `event`, `artifact`, ...);
/// `label` is a human string (title, type name, ...) that gets slugified for readability.
pub fn generate_id(kind: &str, label: &str) -> String {
    let prefix = hex_prefix();
    let slug = slugify(label);
    if slug.is_empty() {
        format!("{prefix}-{kind}")
    } else {
        format!("{prefix}-{kind}-{slug}")
    }
}

fn hex_prefix() -> String {
    let uuid = Uuid::now_v7();
    let bytes = uuid.as_bytes();
    to_hex(&bytes[..4])
}

/// Lowercase hex encoding of arbitrary bytes (digests, ids), without pulling in a `hex` crate.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Lowercase, hyphenated, ASCII-alphanumeric slug of `s`, truncated to a reasonable length.
pub fn slugify(s: &str) -> String {
    let mut out = String::new();
    let mut last_was_hyphen = true; // suppress leading hyphens
    for ch in s.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if ch.is_whitespace() || ch == '-' || ch == '_' {
            if !last_was_hyphen {
                out.push('-');
                last_was_hyphen = true;
            }
        }
        // apostrophes and other punctuation are stripped silently
    }
    while out.ends_with('-') {
        out.pop();
    }
    out.truncate(40);
    while out.ends_with('-') {
        out.pop();
    }
    out
}
