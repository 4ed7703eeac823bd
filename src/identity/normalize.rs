//! Canonical forms for identity fields.

use chrono::NaiveDate;
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

/// Lowercase, NFD-decompose, strip combining marks, trim and collapse whitespace.
///
/// "  José   MARTÍNEZ " becomes "jose martinez".
#[must_use]
pub fn normalize_name(input: &str) -> String {
    let stripped: String = input
        .to_lowercase()
        .nfd()
        .filter(|ch| !is_combining_mark(*ch))
        .collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a birth date as `YYYY-MM-DD`. RFC 3339 timestamps are reduced to their
/// date part, as stored profiles sometimes carry one.
#[must_use]
pub fn normalize_birth_date(input: &str) -> Option<NaiveDate> {
    let trimmed = input.trim();
    let date_part = trimmed.split_once('T').map_or(trimmed, |(date, _)| date);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}
