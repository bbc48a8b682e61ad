//! Markup cell detection
//!
//! The classifier is a heuristic, not a parser: a textual cell "looks like
//! markup" when it contains an opening angle bracket immediately followed by
//! a letter, any run of characters, and a closing angle bracket. Partial or
//! malformed tags count as a positive signal on purpose, because the question
//! being answered is "was markup pasted into this cell", not "is this valid
//! markup".

use crate::reader::CellValue;
use regex::Regex;
use std::sync::OnceLock;

static TAG_PATTERN: OnceLock<Regex> = OnceLock::new();

fn tag_pattern() -> &'static Regex {
    TAG_PATTERN.get_or_init(|| Regex::new(r"(?is)<[a-z].*?>").unwrap())
}

/// Check whether a cell value is markup. Only textual, non-blank cells can be.
pub fn is_markup(value: &CellValue) -> bool {
    match value {
        CellValue::Text(text) => is_markup_text(text),
        _ => false,
    }
}

/// Check whether a string is markup per the tag heuristic
pub fn is_markup_text(text: &str) -> bool {
    if text.trim().is_empty() {
        return false;
    }
    tag_pattern().is_match(text)
}
