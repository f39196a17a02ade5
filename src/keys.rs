//! Join-key canonicalization.
//!
//! Keys arrive from spreadsheets and CSV exports in slightly different
//! shapes: `10248` next to `10248.0`, padded with spaces, or carrying a
//! textual missing marker such as `nan`. Every table that takes part in a
//! join runs its key columns through [`normalize_key`] first so equal logical
//! keys compare equal.

use std::sync::OnceLock;

use regex::Regex;

use crate::{
    data::{Cell, Value},
    frame::Frame,
};

/// Markers that mean "missing" once surrounding whitespace is gone.
pub const DEFAULT_MISSING_MARKERS: &[&str] = &["nan", "<na>", "none", "null", "nat"];

static KEY_PATTERN: OnceLock<Regex> = OnceLock::new();

fn key_pattern() -> &'static Regex {
    KEY_PATTERN.get_or_init(|| {
        Regex::new(r"(?s)^\s*(.*?)(?:\s*\.0)*\s*$").expect("key pattern is valid")
    })
}

/// Canonical text of a key, or `None` when the key is missing.
///
/// Trailing `.0` artifacts are stripped until none remain, so the result is
/// a fixed point: normalizing it again changes nothing.
pub fn normalize_key_text(raw: &str, missing_markers: &[String]) -> Option<String> {
    let cleaned = key_pattern()
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or("");
    if cleaned.is_empty() || is_missing_marker(cleaned, missing_markers) {
        None
    } else {
        Some(cleaned.to_string())
    }
}

pub fn normalize_key(cell: Option<&Value>, missing_markers: &[String]) -> Option<String> {
    normalize_key_text(&cell?.as_display(), missing_markers)
}

fn is_missing_marker(value: &str, markers: &[String]) -> bool {
    markers.iter().any(|m| m.eq_ignore_ascii_case(value))
}

pub fn default_missing_markers() -> Vec<String> {
    DEFAULT_MISSING_MARKERS.iter().map(|m| m.to_string()).collect()
}

/// Normalizes each of `keys` that exists in `frame`, turning the column into
/// text keys. Returns how many of the columns were present.
pub fn normalize_key_columns(frame: &mut Frame, keys: &[String], missing_markers: &[String]) -> usize {
    keys.iter()
        .filter(|key| {
            frame.map_column(key, |cell: Cell| {
                normalize_key(cell.as_ref(), missing_markers).map(Value::String)
            })
        })
        .count()
}
