//! Tier 2: pull fields out of prose by their `Heading:` markers.

use crate::result::is_empty_value;
use crate::schema::ResponseSchema;
use crate::values::from_section;
use regex_lite::Regex;
use serde_json::{Map, Value};

/// Every heading token of every field, longest first, with the index of the
/// field it belongs to.
pub(crate) fn heading_index(schema: &ResponseSchema) -> Vec<(String, usize)> {
    let mut index: Vec<(String, usize)> = Vec::new();
    for (i, field) in schema.fields.iter().enumerate() {
        for token in field.heading_tokens() {
            if !index.iter().any(|(t, _)| t.eq_ignore_ascii_case(&token)) {
                index.push((token, i));
            }
        }
    }
    index.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    index
}

fn heading_pattern(index: &[(String, usize)]) -> Option<Regex> {
    if index.is_empty() {
        return None;
    }
    let alternatives: Vec<String> = index.iter().map(|(t, _)| regex_lite::escape(t)).collect();
    let pattern = format!(
        r#"(?im)(?:^[ \t]*(?:[#>*_\-•]+[ \t]*)*(?:\d+[.)][ \t]*)?(?:\*\*|__)?[ \t]*["']?|[{{,][ \t]*["'])({})["']?[ \t]*(?:\*\*|__)?[ \t]*:[ \t]*(?:\*\*|__)?[ \t]*"#,
        alternatives.join("|")
    );
    Regex::new(&pattern).ok()
}

/// Extract every field whose heading appears in `text`. Fields without a
/// heading come back empty. The first non-empty section for a field wins.
pub(crate) fn extract(text: &str, schema: &ResponseSchema) -> Map<String, Value> {
    let mut fields = schema.empty_fields();
    let index = heading_index(schema);

    if let Some(re) = heading_pattern(&index) {
        let mut marks: Vec<(usize, usize, usize)> = Vec::new();
        for caps in re.captures_iter(text) {
            let (Some(whole), Some(token)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if let Some((_, field)) = index
                .iter()
                .find(|(t, _)| t.eq_ignore_ascii_case(token.as_str()))
            {
                marks.push((*field, whole.start(), whole.end()));
            }
        }

        for (n, (field_idx, _, body_start)) in marks.iter().enumerate() {
            let body_end = marks.get(n + 1).map_or(text.len(), |next| next.1);
            let spec = &schema.fields[*field_idx];
            let slot = fields.entry(spec.name.clone()).or_insert_with(|| spec.empty_value());
            if !is_empty_value(slot) {
                continue;
            }
            *slot = from_section(spec, &text[*body_start..body_end]);
        }
    }

    // A lone object list with no heading: take objects from anywhere.
    if let Some(idx) = schema.sole_object_list() {
        let spec = &schema.fields[idx];
        if fields.get(&spec.name).is_none_or(is_empty_value) {
            let found: Vec<Value> = from_section(spec, text)
                .as_array()
                .cloned()
                .unwrap_or_default();
            if !found.is_empty() {
                fields.insert(spec.name.clone(), Value::Array(found));
            }
        }
    }

    fields
}
