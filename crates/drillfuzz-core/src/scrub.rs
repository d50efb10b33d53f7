//! Text and snapshot scrubbing
//!
//! Removes run-specific noise (trace ids, timestamps, GUIDs) so repeated runs
//! against the same target produce identical output.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static TRACE_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)"traceId":"[^"]*",?"#).ok());

static ISO_TIMESTAMP: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}Z").ok());

static GUID: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$").ok()
});

static DATE_TIME_PREFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}").ok());

fn replace_all(re: &Option<Regex>, text: &str, rep: &str) -> String {
    re.as_ref()
        .map_or_else(|| text.to_string(), |re| re.replace_all(text, rep).into_owned())
}

fn is_match(re: &Option<Regex>, text: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(text))
}

pub const SCRUBBED_GUID: &str = "ScrubbedGuid";
pub const SCRUBBED_DATE_TIME: &str = "ScrubbedDateTime";
pub const REMOVED_DATE: &str = "REMOVED_DATE";

/// Normalize a target exception message.
///
/// Newlines become spaces, `"traceId":"..."` fields are dropped, UTC timestamps
/// become `REMOVED_DATE`, and leading/trailing spaces and commas are trimmed.
#[must_use]
pub fn scrub_message(message: &str) -> String {
    if message.trim().is_empty() {
        return String::new();
    }
    let flat = message.replace(['\r', '\n'], " ");
    let without_trace = replace_all(&TRACE_ID, &flat, "");
    let without_dates = replace_all(&ISO_TIMESTAMP, &without_trace, REMOVED_DATE);
    without_dates
        .trim_matches(|c| c == ' ' || c == ',')
        .to_string()
}

/// Replace GUID-shaped and timestamp-shaped strings anywhere in a JSON tree.
pub fn scrub_snapshot(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::String(s) => {
            if is_match(&GUID, s) {
                *s = SCRUBBED_GUID.to_string();
            } else if is_match(&DATE_TIME_PREFIX, s) {
                *s = SCRUBBED_DATE_TIME.to_string();
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(scrub_snapshot),
        serde_json::Value::Object(map) => map.values_mut().for_each(scrub_snapshot),
        _ => {}
    }
}

/// Serialize to pretty JSON with [`scrub_snapshot`] applied.
///
/// # Errors
///
/// Returns the serializer error if `value` cannot be represented as JSON.
pub fn to_scrubbed_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let mut json = serde_json::to_value(value)?;
    scrub_snapshot(&mut json);
    serde_json::to_string_pretty(&json)
}
