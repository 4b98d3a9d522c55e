//! Pre-parse rewrites for known model failure modes.
//!
//! These operate on the raw text because the text itself is not valid JSON
//! until rewritten: code fences around the payload, numerals quoted as
//! strings, and bare numeric ranges that are not JSON values at all.

use crate::schema::{FieldKind, ResponseSchema};
use regex_lite::{Captures, Regex};

/// Remove a markdown code fence (```` ``` ```` or ```` ```json ````) around the
/// payload. Returns `None` when the text has no fence. An unterminated
/// fence (a truncated reply) keeps everything after the opener.
pub(crate) fn strip_code_fences(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let tag_len: usize = after
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .map(char::len_utf8)
        .sum();
    let body = &after[tag_len..];
    let body = match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    };
    Some(body.trim())
}

/// Rewrite numeric fields so the text parses with the right types:
///
/// - `"target_sample": "5000"` / `"5,000"` → `"target_sample": 5000`
/// - `"target_sample": 5000-10000` → `"target_sample": "5000-10000"`
///
/// Quoted ranges (`"5000-10000"`) are left as strings. Returns the
/// rewritten text and a description of each rewrite applied.
pub(crate) fn rewrite_numeric_fields(text: &str, schema: &ResponseSchema) -> (String, Vec<String>) {
    let mut out = text.to_string();
    let mut applied = Vec::new();

    for field in schema.fields.iter().filter(|f| f.kind == FieldKind::Number) {
        let key = regex_lite::escape(&field.name);

        let quoted = format!(r#""{key}"\s*:\s*"\s*(-?(?:\d{{1,3}}(?:,\d{{3}})+|\d+)(?:\.\d+)?)\s*""#);
        if let Ok(re) = Regex::new(&quoted) {
            if re.is_match(&out) {
                out = re
                    .replace_all(&out, |caps: &Captures<'_>| {
                        format!("\"{}\": {}", field.name, caps[1].replace(',', ""))
                    })
                    .into_owned();
                applied.push(format!("unquoted numeric value of '{}'", field.name));
            }
        }

        let range = format!(
            r#""{key}"\s*:\s*(-?\d+(?:[.,]\d+)*\s*(?:-|–|to)\s*\d+(?:[.,]\d+)*[^,}}\]\n"]*)"#
        );
        if let Ok(re) = Regex::new(&range) {
            if re.is_match(&out) {
                out = re
                    .replace_all(&out, |caps: &Captures<'_>| {
                        format!("\"{}\": \"{}\"", field.name, caps[1].trim())
                    })
                    .into_owned();
                applied.push(format!("quoted numeric range of '{}'", field.name));
            }
        }
    }

    (out, applied)
}

/// Slices of `text` worth handing to the JSON parser, most specific last:
/// the whole text, then the span from the first `{`/`[` to the last
/// `}`/`]` (prose wrapped around a payload). Truncated payloads are not
/// repaired; they simply fail to parse.
pub(crate) fn json_candidates(text: &str) -> Vec<&str> {
    let trimmed = text.trim();
    let mut candidates = vec![trimmed];
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) {
            if start < end {
                let slice = &trimmed[start..=end];
                if !candidates.contains(&slice) {
                    candidates.push(slice);
                }
            }
        }
    }
    // Prefer whichever payload starts earliest after the whole text.
    candidates[1..].sort_by_key(|slice| slice.as_ptr() as usize);
    candidates
}
