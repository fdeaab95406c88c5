//! Helpers for normalizing caller-supplied identifiers.

use std::path::Path;

/// Session used when the caller does not name one.
pub const DEFAULT_SESSION_ID: &str = "default";

const MAX_SESSION_ID_LEN: usize = 64;

/// Sanitize arbitrary string input by trimming whitespace and dropping empties.
pub(crate) fn sanitize_string(value: Option<&str>) -> Option<String> {
    value.and_then(|input| {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Normalize a session id into a single safe path component.
///
/// Keeps ASCII alphanumerics, `-` and `_`, truncates to 64 characters, and falls back to
/// [`DEFAULT_SESSION_ID`] when nothing usable remains.
pub fn sanitize_session_id(value: Option<&str>) -> String {
    let cleaned: String = sanitize_string(value)
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(MAX_SESSION_ID_LEN)
        .collect();
    if cleaned.is_empty() {
        DEFAULT_SESSION_ID.to_string()
    } else {
        cleaned
    }
}

/// Reduce an uploaded file name to its final component, rejecting names that would resolve
/// outside the documents directory.
pub fn sanitize_file_name(value: &str) -> Option<String> {
    let trimmed = sanitize_string(Some(value))?;
    // Browsers on Windows send backslash-separated paths.
    let normalized = trimmed.replace('\\', "/");
    let name = Path::new(&normalized).file_name()?.to_str()?;
    if name.starts_with('.') {
        return None;
    }
    Some(name.to_string())
}
