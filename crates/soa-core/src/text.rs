//! Label normalization shared by alignment and duplicate detection.

/// Lowercase, replace punctuation with spaces and collapse whitespace.
///
/// `"Visit 1 – Screening"` and `"visit 1 screening"` normalize identically.
pub fn normalize_label(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_space = false;
    for ch in value.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

/// Whether a value carries any alphanumeric content.
pub fn has_alphanumeric(value: &str) -> bool {
    value.chars().any(char::is_alphanumeric)
}

/// Collapse runs of whitespace to single spaces and trim.
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
