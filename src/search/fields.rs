//! Field access on opaque issue records
use super::Issue;
use chrono::{DateTime, NaiveDate};
use serde_json::Value as Json;

/// Label used for a field that is present but empty.
pub const NONE_LABEL: &str = "(none)";

/// Keys tried, in order, when an object value is collapsed to one label.
const LABEL_KEYS: &[&str] = &["name", "login", "shortName", "presentation"];

/// Looks up `field` on an issue.
///
/// Tries the exact top-level key, then a dotted path (`project.archived`),
/// then a case-insensitive top-level key, then `customFields` entries of
/// the form `{"name": .., "value": ..}`.
pub fn lookup<'a>(issue: &'a Issue, field: &str) -> Option<&'a Json> {
    let object = issue.as_object()?;
    if let Some(value) = object.get(field) {
        return Some(value);
    }

    if field.contains('.') {
        let mut current = issue;
        let mut found = true;
        for part in field.split('.') {
            match current.get(part) {
                Some(next) => current = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if found {
            return Some(current);
        }
    }

    if let Some((_, value)) = object.iter().find(|(k, _)| k.eq_ignore_ascii_case(field)) {
        return Some(value);
    }

    object
        .get("customFields")
        .and_then(Json::as_array)?
        .iter()
        .find(|custom| {
            custom
                .get("name")
                .and_then(Json::as_str)
                .is_some_and(|name| name.eq_ignore_ascii_case(field))
        })
        .and_then(|custom| custom.get("value"))
}

/// One display label per element: arrays yield one label per item,
/// objects collapse to their first label key, `null` yields [`NONE_LABEL`].
pub fn labels(value: &Json) -> Vec<String> {
    match value {
        Json::Array(items) if items.is_empty() => vec![NONE_LABEL.to_string()],
        Json::Array(items) => items.iter().flat_map(labels).collect(),
        Json::Object(map) => {
            let label = LABEL_KEYS
                .iter()
                .find_map(|key| map.get(*key).filter(|v| !v.is_null()))
                .map(scalar_text)
                .unwrap_or_else(|| NONE_LABEL.to_string());
            vec![label]
        }
        Json::Null => vec![NONE_LABEL.to_string()],
        scalar => vec![scalar_text(scalar)],
    }
}

/// Every string an operand may be compared against. Objects contribute all
/// of their label keys so `project: TEST` matches on `shortName` as well as
/// on `name`.
pub fn candidates(value: &Json) -> Vec<String> {
    match value {
        Json::Array(items) => items.iter().flat_map(candidates).collect(),
        Json::Object(map) => LABEL_KEYS
            .iter()
            .chain(["idReadable", "id"].iter())
            .filter_map(|key| map.get(*key))
            .filter(|v| !v.is_null())
            .map(scalar_text)
            .collect(),
        Json::Null => Vec::new(),
        scalar => vec![scalar_text(scalar)],
    }
}

/// Whether a present value carries anything.
pub fn is_present(value: &Json) -> bool {
    match value {
        Json::Null => false,
        Json::String(s) => !s.is_empty(),
        Json::Array(items) => !items.is_empty(),
        _ => true,
    }
}

/// Reads a calendar date out of `YYYY-MM-DD...` text or epoch milliseconds.
pub fn as_date(candidate: &str) -> Option<NaiveDate> {
    if let Some(prefix) = candidate.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(date);
        }
    }
    let millis = candidate.parse::<i64>().ok()?;
    DateTime::from_timestamp_millis(millis).map(|dt| dt.date_naive())
}

fn scalar_text(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}
