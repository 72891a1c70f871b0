//! Derived names for tables, topics, indexes and columns.

use chrono::{DateTime, Datelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::defaults::TYPE_NAME_SUFFIX;
use crate::record::RecordKind;

static LOWER_UPPER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid word boundary regex"));
static ACRONYM_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").expect("valid acronym regex"));

/// Split a camel-case name at word boundaries, joined by `sep` and lowercased.
///
/// `OrderLog` becomes `order_log`, `HTTPRequestLog` becomes `http_request_log`.
pub fn split_words(name: &str, sep: &str) -> String {
    let replacement = format!("${{1}}{}${{2}}", sep);
    let step = ACRONYM_WORD.replace_all(name, replacement.as_str());
    LOWER_UPPER
        .replace_all(&step, replacement.as_str())
        .to_lowercase()
}

pub fn snake_case(name: &str) -> String {
    split_words(name, "_")
}

pub fn kebab_case(name: &str) -> String {
    split_words(name, "-")
}

/// Column name for an extension field.
pub fn column_name(field: &str) -> String {
    snake_case(field)
}

/// Table name: the kind's fixed name, or `prefix` + snake-cased type name.
pub fn table_name(kind: &RecordKind, prefix: &str) -> String {
    match kind.table_name_override() {
        Some(name) => name.to_string(),
        None => format!("{}{}", prefix, snake_case(kind.name())),
    }
}

/// Queue topic: `prefix` + snake-cased type name.
pub fn topic_name(kind: &RecordKind, prefix: &str) -> String {
    format!("{}{}", prefix, snake_case(kind.name()))
}

/// Search index: `{prefix}-{type}-{yyyy}-{MM}`, with a trailing `Log`
/// dropped from the type name.
pub fn index_name(prefix: &str, kind: &RecordKind, at: DateTime<Utc>) -> String {
    let name = kind.name();
    let stem = match name.strip_suffix(TYPE_NAME_SUFFIX) {
        Some(stem) if !stem.is_empty() => stem,
        _ => name,
    };
    format!(
        "{}-{}-{:04}-{:02}",
        prefix,
        kebab_case(stem),
        at.year(),
        at.month()
    )
}
