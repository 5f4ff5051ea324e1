//! Decoding of comma-joined columns.
//!
//! Several war tables store small arrays as a single comma-joined text column
//! (`progress`, `value_types`, `values`, `keys`). These helpers turn them back
//! into arrays before records leave the persistence layer.

use super::error::DomainError;

/// Split a comma-joined list of integers.
///
/// An empty column decodes to an empty list; whitespace around items is ignored.
pub fn number_list(field: &'static str, raw: &str) -> Result<Vec<i64>, DomainError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    raw.split(',')
        .map(|item| {
            item.trim()
                .parse::<i64>()
                .map_err(|_| DomainError::decode(field, item))
        })
        .collect()
}

/// Split a comma-joined list of strings, keeping items verbatim.
pub fn string_list(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(',').map(str::to_string).collect()
}
