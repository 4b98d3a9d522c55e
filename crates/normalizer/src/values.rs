//! Conversions from parsed JSON or captured text into field values.
//!
//! Both directions end in the same shapes: strings for `text`, numbers (or
//! the original string) for `number`, arrays of strings for `text_list`,
//! and arrays of objects carrying every declared subfield for `object_list`.

use crate::objects;
use crate::schema::{FieldKind, FieldSpec};
use regex_lite::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Leading bullet, numbering, and punctuation tokens on a list line.
static LIST_PREFIX: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[-\d.\s]+").ok());

/// A complete JSON string literal.
static QUOTED: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r#""(?:[^"\\]|\\.)*""#).ok());

/// Line breaks or `*` bullet markers.
static LIST_SPLIT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\r?\n|(?:^|\s)\*\s+").ok());

// ── From parsed JSON ──────────────────────────────────────────────────────

/// Convert a parsed JSON value into the declared kind. `None` means the
/// key was absent.
pub(crate) fn from_json(spec: &FieldSpec, value: Option<&Value>) -> Value {
    let Some(value) = value else {
        return spec.empty_value();
    };
    match spec.kind {
        FieldKind::Text => Value::String(json_text(value)),
        FieldKind::Number => match value {
            Value::Number(_) => value.clone(),
            Value::String(s) => Value::String(s.clone()),
            other => Value::String(json_text(other)),
        },
        FieldKind::TextList => Value::Array(
            list_items(value)
                .iter()
                .map(json_text)
                .filter(|s| !s.trim().is_empty())
                .map(Value::String)
                .collect(),
        ),
        FieldKind::ObjectList => Value::Array(
            list_items(value)
                .into_iter()
                .filter_map(|item| shape_object(spec, item))
                .map(Value::Object)
                .collect(),
        ),
    }
}

/// The string form of a JSON value. Nested lists join with newlines.
pub(crate) fn json_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(json_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(_) => value.to_string(),
    }
}

/// Treat a value as a list: arrays as-is, numeric-keyed objects in key
/// order, any other non-null value as a singleton.
pub(crate) fn list_items(value: &Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.clone(),
        Value::Object(map) => numeric_keyed(map).unwrap_or_else(|| vec![value.clone()]),
        Value::String(s) if s.trim().is_empty() => Vec::new(),
        other => vec![other.clone()],
    }
}

/// `{"0": a, "1": b}` → `[a, b]`, ordered by ascending numeric key.
/// `None` unless every key is a non-negative integer.
pub(crate) fn numeric_keyed(map: &Map<String, Value>) -> Option<Vec<Value>> {
    if map.is_empty() {
        return None;
    }
    let mut keyed: Vec<(u64, &Value)> = map
        .iter()
        .map(|(k, v)| k.trim().parse::<u64>().ok().map(|n| (n, v)))
        .collect::<Option<_>>()?;
    keyed.sort_by_key(|(n, _)| *n);
    Some(keyed.into_iter().map(|(_, v)| v.clone()).collect())
}

/// Coerce a list item into an object. Objects pass through as given; a
/// bare string becomes the first subfield.
fn shape_object(spec: &FieldSpec, item: Value) -> Option<Map<String, Value>> {
    match item {
        Value::Object(map) => Some(map),
        Value::String(s) if !s.trim().is_empty() => {
            let key = spec.subfields.first().cloned().unwrap_or_else(|| "value".into());
            let mut map = Map::new();
            map.insert(key, Value::String(s));
            Some(map)
        }
        _ => None,
    }
}

// ── From captured text ────────────────────────────────────────────────────

/// Convert a captured section body into the declared kind.
pub(crate) fn from_section(spec: &FieldSpec, body: &str) -> Value {
    match spec.kind {
        FieldKind::Text => Value::String(clean_scalar(body)),
        FieldKind::Number => {
            let text = clean_scalar(body);
            parse_number(&text).unwrap_or(Value::String(text))
        }
        FieldKind::TextList => Value::Array(
            split_list(body).into_iter().map(Value::String).collect(),
        ),
        FieldKind::ObjectList => Value::Array(
            objects::scan(body, &spec.subfields)
                .into_iter()
                .filter_map(|obj| shape_object(spec, Value::Object(obj)))
                .map(Value::Object)
                .collect(),
        ),
    }
}

/// Tidy a scalar section: drop fence and blank lines, markdown bold, the
/// trailing comma and quotes left behind by half-formed JSON.
pub(crate) fn clean_scalar(body: &str) -> String {
    let joined = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("```"))
        .filter(|line| !matches!(*line, "{" | "}" | "[" | "]" | "}," | "],"))
        .collect::<Vec<_>>()
        .join("\n");
    let trimmed = joined.trim().trim_end_matches(',').trim();

    if trimmed.starts_with('"') {
        // Only the leading string literal; whatever trails it is debris.
        let mut stream = serde_json::Deserializer::from_str(trimmed).into_iter::<String>();
        if let Some(Ok(s)) = stream.next() {
            return s.trim().to_string();
        }
    }

    trimmed
        .replace("**", "")
        .trim_matches(|c| c == '"' || c == '_')
        .trim()
        .to_string()
}

/// Split a list section into items: a JSON array if it is one, otherwise
/// one item per line or `*` bullet, with leading bullet/number tokens
/// stripped and empty lines dropped.
pub(crate) fn split_list(body: &str) -> Vec<String> {
    let trimmed = body.trim().trim_end_matches(',').trim();
    if trimmed.starts_with('[') {
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed) {
            return items
                .iter()
                .map(json_text)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        // A cut-off array: keep the string literals that did close.
        let closed = quoted_strings(trimmed);
        if !closed.is_empty() {
            return closed;
        }
    }

    let pieces: Vec<&str> = match LIST_SPLIT.as_ref() {
        Some(re) => re.split(body).collect(),
        None => body.lines().collect(),
    };

    pieces
        .into_iter()
        .map(clean_list_item)
        .filter(|item| !item.is_empty())
        .collect()
}

/// Every complete JSON string literal in `text`, in order.
fn quoted_strings(text: &str) -> Vec<String> {
    let Some(re) = QUOTED.as_ref() else {
        return Vec::new();
    };
    re.find_iter(text)
        .filter_map(|m| serde_json::from_str::<String>(m.as_str()).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn clean_list_item(line: &str) -> String {
    let line = line.trim();
    if line.starts_with("```") {
        return String::new();
    }
    let line = line.trim_start_matches(['•', '*', '[']).trim_start();
    let line = match LIST_PREFIX.as_ref() {
        Some(re) => re.replace(line, "").into_owned(),
        None => line.to_string(),
    };
    line.trim()
        .trim_end_matches([',', ']'])
        .trim()
        .trim_matches(|c| c == '"' || c == '*' || c == '_')
        .trim()
        .to_string()
}

/// `"5,000"` → `5000`, `"2.5"` → `2.5`; anything else is not a number.
fn parse_number(text: &str) -> Option<Value> {
    let digits = text.replace(',', "");
    if let Ok(n) = digits.parse::<i64>() {
        return Some(Value::from(n));
    }
    digits
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}
