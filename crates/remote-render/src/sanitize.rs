//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Uploads may arrive with client-side paths attached; spans only ever see
//! the final file name component.

/// Returns only the final component of an uploaded file name.
///
/// Handles both `/` and `\` separators since the name comes from the client.
pub fn redact_file_name(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    if last.is_empty() {
        "<unknown>".to_string()
    } else {
        last.to_string()
    }
}

/// Extension of a file name including the leading dot, from the last `.`.
///
/// Returns an empty string when there is no dot.
pub fn file_extension(name: &str) -> String {
    let name = redact_file_name(name);
    match name.rfind('.') {
        Some(index) => name[index..].to_string(),
        None => String::new(),
    }
}

/// Truncates `text` to at most `max` characters, appending a marker when cut.
pub fn truncate_for_log(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}... (truncated)", cut)
}
