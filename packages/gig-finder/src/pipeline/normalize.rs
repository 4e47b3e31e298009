//! Field normalizer - whitespace cleanup at the crawler boundary.

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::types::record::{FieldValue, JobRecord, RawRecord, RawValue};

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Trim a string and collapse internal whitespace runs to one space.
pub fn clean_string(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text.trim(), " ").into_owned()
}

/// Normalize a single raw value.
///
/// Strings are cleaned, lists keep only their (cleaned) string elements,
/// integers and flags pass through. Null and values with no cleaned form
/// (floats, objects) become `None`.
pub fn normalize_value(value: RawValue) -> Option<FieldValue> {
    match value {
        RawValue::Null | RawValue::Other(_) => None,
        RawValue::Flag(flag) => Some(FieldValue::Flag(flag)),
        RawValue::Integer(n) => Some(FieldValue::Integer(n)),
        RawValue::Text(text) => Some(FieldValue::Text(clean_string(&text))),
        RawValue::List(items) => Some(FieldValue::List(
            items
                .into_iter()
                .filter_map(|item| match item {
                    RawValue::Text(text) => Some(clean_string(&text)),
                    _ => None,
                })
                .collect(),
        )),
    }
}

/// Normalize a raw crawler record into a [`JobRecord`].
pub fn normalize(raw: RawRecord) -> JobRecord {
    let mut record = JobRecord::new(clean_string(&raw.id));

    for (key, value) in raw.fields {
        let Some(value) = normalize_value(value) else {
            continue;
        };
        if !record.set(&key, value) {
            debug!(id = %record.id, field = %key, "Dropping unrecognised field");
        }
    }

    record
}
