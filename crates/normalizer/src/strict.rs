//! Tier 1: parse the reply as JSON and fit it to the schema.

use crate::preprocess::{json_candidates, rewrite_numeric_fields, strip_code_fences};
use crate::result::NormalizeTrace;
use crate::schema::{FieldSpec, ResponseSchema, SchemaRoot};
use crate::values::{from_json, numeric_keyed};
use serde_json::{Map, Value};

/// Try to parse `raw` as JSON. Returns the fitted fields, or `None` when no
/// candidate parses into an object or array.
///
/// The whole text is taken on its own terms. A slice cut out of surrounding
/// prose only counts when it looks like this schema's payload, so a stray
/// inline snippet cannot hide the headings around it.
pub(crate) fn parse(
    raw: &str,
    schema: &ResponseSchema,
    trace: &mut NormalizeTrace,
) -> Option<Map<String, Value>> {
    let unfenced = match strip_code_fences(raw) {
        Some(body) => {
            trace.rewrites.push("stripped markdown code fence".into());
            body
        }
        None => raw,
    };

    let (text, rewrites) = rewrite_numeric_fields(unfenced, schema);
    trace.rewrites.extend(rewrites);

    json_candidates(&text)
        .into_iter()
        .enumerate()
        .filter_map(|(i, candidate)| {
            serde_json::from_str::<Value>(candidate)
                .ok()
                .map(|value| (i == 0, value))
        })
        .filter(|(whole, value)| *whole || recognizable(value, schema))
        .find_map(|(_, value)| fit(value, schema))
}

/// Whether a value carries something this schema can use: a declared key,
/// numeric keys standing in for a list, or a list where one is expected.
fn recognizable(value: &Value, schema: &ResponseSchema) -> bool {
    match value {
        Value::Object(map) => {
            numeric_keyed(map).is_some()
                || schema.fields.iter().any(|field| lookup(map, field).is_some())
        }
        Value::Array(items) => {
            schema.root == SchemaRoot::Array
                || schema.sole_list_field().is_some()
                || items.iter().any(|item| recognizable(item, schema))
        }
        _ => false,
    }
}

/// Fit a parsed container to the schema. Scalars do not fit.
fn fit(value: Value, schema: &ResponseSchema) -> Option<Map<String, Value>> {
    match (schema.root, value) {
        (SchemaRoot::Object, Value::Object(map)) => Some(fit_object(&map, schema)),
        (SchemaRoot::Object, Value::Array(items)) => {
            if let Some(idx) = schema.sole_list_field() {
                return Some(only(schema, idx, Value::Array(items)));
            }
            items.into_iter().find_map(|item| match item {
                Value::Object(map) => Some(fit_object(&map, schema)),
                _ => None,
            })
        }
        (SchemaRoot::Array, Value::Array(items)) => Some(only(schema, 0, Value::Array(items))),
        (SchemaRoot::Array, Value::Object(map)) => {
            let field = schema.fields.first()?;
            let value = match numeric_keyed(&map) {
                Some(items) => Value::Array(items),
                None => match lookup(&map, field) {
                    Some(inner) => inner.clone(),
                    // A single item where the list was expected.
                    None if field.subfields.is_empty()
                        || field.subfields.iter().any(|s| map.contains_key(s)) =>
                    {
                        Value::Object(map)
                    }
                    None => return None,
                },
            };
            Some(only(schema, 0, value))
        }
        _ => None,
    }
}

fn fit_object(map: &Map<String, Value>, schema: &ResponseSchema) -> Map<String, Value> {
    // `{"0": {...}, "1": {...}}` where the whole reply should have been the list.
    if let (Some(items), Some(idx)) = (numeric_keyed(map), schema.sole_list_field()) {
        return only(schema, idx, Value::Array(items));
    }

    schema
        .fields
        .iter()
        .map(|field| (field.name.clone(), from_json(field, lookup(map, field))))
        .collect()
}

/// Exact key first, then any key that matches loosely.
fn lookup<'a>(map: &'a Map<String, Value>, field: &FieldSpec) -> Option<&'a Value> {
    map.get(&field.name).or_else(|| {
        map.iter()
            .find(|(key, _)| field.matches_key(key))
            .map(|(_, value)| value)
    })
}

/// Every field empty except `schema.fields[idx]`, which receives `value`.
fn only(schema: &ResponseSchema, idx: usize, value: Value) -> Map<String, Value> {
    schema
        .fields
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let v = if i == idx {
                from_json(field, Some(&value))
            } else {
                field.empty_value()
            };
            (field.name.clone(), v)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn experiment_schema() -> ResponseSchema {
        ResponseSchema::object(vec![
            FieldSpec::text("hypothesis", "Hypothesis"),
            FieldSpec::number("target_sample", "Target Sample"),
            FieldSpec::text_list("success_metrics", "Success Metrics"),
        ])
    }

    fn tensions_schema() -> ResponseSchema {
        ResponseSchema::array(FieldSpec::object_list(
            "tensions",
            "Tensions",
            &["tension", "pole_a", "pole_b"],
        ))
    }

    fn run(raw: &str, schema: &ResponseSchema) -> Option<Map<String, Value>> {
        parse(raw, schema, &mut NormalizeTrace::default())
    }

    #[test]
    fn loose_keys_and_lone_scalars() {
        let raw = r#"{"Hypothesis": "Teams skip retros", "targetSample": 40, "success_metrics": "attendance"}"#;
        let fields = run(raw, &experiment_schema()).unwrap();
        assert_eq!(fields["hypothesis"], "Teams skip retros");
        assert_eq!(fields["target_sample"], 40);
        assert_eq!(fields["success_metrics"], json!(["attendance"]));
    }

    #[test]
    fn fenced_payload_with_quoted_number() {
        let raw = "```json\n{\"hypothesis\": \"h\", \"target_sample\": \"5000\"}\n```";
        let mut trace = NormalizeTrace::default();
        let fields = parse(raw, &experiment_schema(), &mut trace).unwrap();
        assert_eq!(fields["target_sample"], 5000);
        assert_eq!(fields["success_metrics"], json!([]));
        assert_eq!(trace.rewrites.len(), 2);
    }

    #[test]
    fn array_root_accepts_numeric_keyed_object() {
        let raw = r#"{"1": {"tension": "b"}, "0": {"tension": "a", "pole_a": "x", "pole_b": "y"}}"#;
        let fields = run(raw, &tensions_schema()).unwrap();
        let tensions = fields["tensions"].as_array().unwrap();
        assert_eq!(tensions.len(), 2);
        assert_eq!(tensions[0]["tension"], "a");
        assert!(tensions[1].get("pole_a").is_none());
    }

    #[test]
    fn array_root_unwraps_named_wrapper() {
        let raw = r#"{"tensions": [{"tension": "speed vs quality"}]}"#;
        let fields = run(raw, &tensions_schema()).unwrap();
        assert_eq!(fields["tensions"][0]["tension"], "speed vs quality");
    }

    #[test]
    fn array_root_wraps_a_single_item() {
        let fields = run(r#"{"tension": "now vs later"}"#, &tensions_schema()).unwrap();
        assert_eq!(fields["tensions"].as_array().unwrap().len(), 1);
        assert!(run(r#"{"unrelated": 1}"#, &tensions_schema()).is_none());
    }

    #[test]
    fn scalar_json_is_a_miss() {
        assert!(run("\"just a string\"", &experiment_schema()).is_none());
        assert!(run("42", &experiment_schema()).is_none());
    }

    #[test]
    fn inline_snippet_in_prose_is_a_miss() {
        let schema = ResponseSchema::object(vec![
            FieldSpec::text("signal_summary", "Signal Summary"),
            FieldSpec::text("why_it_matters", "Why It Matters"),
        ]);
        let raw = "**Signal Summary**: Cancellations spike when the webhook sends {\"event\": \"cancel\"}.\n**Why It Matters**: Revenue risk.";
        assert!(run(raw, &schema).is_none());
    }

    #[test]
    fn payload_wrapped_in_prose_still_parses() {
        let raw = "Here you go: {\"hypothesis\": \"h\", \"target_sample\": 12} Hope it helps!";
        let fields = run(raw, &experiment_schema()).unwrap();
        assert_eq!(fields["hypothesis"], "h");
        assert_eq!(fields["target_sample"], 12);
    }

    #[test]
    fn truncated_json_is_a_miss() {
        assert!(run(r#"{"hypothesis": "cut o"#, &experiment_schema()).is_none());
    }
}
