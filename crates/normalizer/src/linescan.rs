//! Tier 3: walk the reply line by line looking for bare headings.
//!
//! Catches what the colon-anchored section pattern misses: markdown headings
//! on their own line (`## Why It Matters`) and dash-separated inline
//! headings (`Why It Matters - revenue risk`).

use crate::result::is_empty_value;
use crate::schema::ResponseSchema;
use crate::sections::heading_index;
use crate::values::from_section;
use serde_json::{Map, Value};

const SEPARATORS: [char; 5] = [':', '-', '–', '—', '|'];

pub(crate) fn extract(text: &str, schema: &ResponseSchema) -> Map<String, Value> {
    let mut fields = schema.empty_fields();
    let index = heading_index(schema);

    let mut current: Option<usize> = None;
    let mut body = String::new();

    for line in text.lines() {
        if let Some((field_idx, inline)) = match_heading(line, &index) {
            flush(schema, &mut fields, current, &body);
            current = Some(field_idx);
            body.clear();
            body.push_str(inline);
            body.push('\n');
        } else if current.is_some() {
            body.push_str(line);
            body.push('\n');
        }
    }
    flush(schema, &mut fields, current, &body);

    fields
}

fn flush(schema: &ResponseSchema, fields: &mut Map<String, Value>, field: Option<usize>, body: &str) {
    let Some(idx) = field else {
        return;
    };
    let spec = &schema.fields[idx];
    let slot = fields.entry(spec.name.clone()).or_insert_with(|| spec.empty_value());
    if is_empty_value(slot) {
        *slot = from_section(spec, body);
    }
}

/// If `line` is a heading, the field it opens and any content after it.
fn match_heading<'a>(line: &'a str, index: &[(String, usize)]) -> Option<(usize, &'a str)> {
    let stripped = strip_decoration(line);
    if stripped.is_empty() {
        return None;
    }

    for (token, field_idx) in index {
        if stripped.len() < token.len() || !stripped.is_char_boundary(token.len()) {
            continue;
        }
        let (head, rest) = stripped.split_at(token.len());
        if !head.eq_ignore_ascii_case(token) {
            continue;
        }
        let rest = rest.trim_start_matches(['*', '_', '"', '\'']).trim_start();
        if rest.is_empty() {
            return Some((*field_idx, ""));
        }
        if rest.starts_with(SEPARATORS) {
            let inline = rest
                .trim_start_matches(SEPARATORS)
                .trim_start_matches(['*', '_'])
                .trim();
            return Some((*field_idx, inline));
        }
    }
    None
}

/// Drop markdown heading/bullet/quote markers, list numbering, and bold
/// markers from the start of a line.
fn strip_decoration(line: &str) -> &str {
    let mut s = line.trim().trim_start_matches(['#', '>', '*', '_', '-', '•']).trim_start();
    let digits = s.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let after = &s[digits..];
        if let Some(rest) = after.strip_prefix(['.', ')']) {
            s = rest.trim_start();
        }
    }
    s.trim_start_matches(['*', '_', '"', '\'']).trim_end()
}
