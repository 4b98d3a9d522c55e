//! Recover complete JSON objects embedded in otherwise unparseable text.

use serde_json::{Map, Value};

/// Find every complete, parseable JSON object in `text` that carries at
/// least one of `subfields` (any object when `subfields` is empty).
///
/// Objects that do not qualify are searched for nested objects that do.
/// A truncated trailing object is dropped, never repaired.
pub(crate) fn scan(text: &str, subfields: &[String]) -> Vec<Map<String, Value>> {
    let mut found = Vec::new();
    let mut resume = 0;

    for (open, close) in brace_pairs(text.as_bytes()) {
        if open < resume {
            continue;
        }
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&text[open..=close])
            && (subfields.is_empty() || subfields.iter().any(|s| map.contains_key(s)))
        {
            found.push(map);
            resume = close + 1;
        }
    }

    found
}

/// Every balanced `{ ... }` pair in one pass, ordered by opening index.
/// Braces inside string literals are skipped. Unclosed braces yield nothing.
fn brace_pairs(bytes: &[u8]) -> Vec<(usize, usize)> {
    let mut stack: Vec<usize> = Vec::new();
    let mut pairs = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            // Quotes only open strings inside an object; prose is left alone.
            b'"' if !stack.is_empty() => in_string = true,
            b'{' => stack.push(i),
            b'}' => {
                if let Some(open) = stack.pop() {
                    pairs.push((open, i));
                }
            }
            _ => {}
        }
    }

    pairs.sort_unstable_by_key(|&(open, _)| open);
    pairs
}
