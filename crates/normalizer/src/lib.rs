//! # ritualcraft-normalizer
//!
//! Turns an untrusted, free-form model reply into an object with exactly the
//! keys a tool's [`ResponseSchema`] declares, plus a [`ParseStatus`] saying
//! how much the result can be trusted.
//!
//! ## Tiers
//!
//! 1. **Strict**: strip code fences, rewrite known numeric failure modes,
//!    parse as JSON (also the JSON slice inside surrounding prose).
//! 2. **Sections**: find `Heading:` markers for each field's label/name.
//! 3. **Line scan**: headings on their own line or followed by a dash.
//! 4. **Passthrough**: every field empty, the raw text returned beside them.
//!
//! [`normalize`] never fails and never panics. It is pure: the same input
//! always produces the same output.

mod linescan;
mod objects;
mod preprocess;
pub mod result;
pub mod schema;
mod sections;
mod strict;
mod values;

pub use result::{
    FAILED_NOTE, FAILED_WARNING, FALLBACK_NOTE, FALLBACK_WARNING, NormalizeTrace,
    NormalizedResult, ParseStatus, Tier, TierAttempt,
};
pub use schema::{FieldKind, FieldSpec, ResponseSchema, SchemaError, SchemaRoot};

use result::is_empty_value;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Normalize a raw model reply against `schema`.
///
/// # Example
///
/// ```
/// use ritualcraft_normalizer::{normalize, FieldSpec, ParseStatus, ResponseSchema};
///
/// let schema = ResponseSchema::object(vec![FieldSpec::text("headline", "Headline")]);
/// let result = normalize(r#"{"headline": "Ship the beta"}"#, &schema);
/// assert_eq!(result.parse_status, ParseStatus::Success);
/// assert_eq!(result.fields["headline"], "Ship the beta");
/// ```
pub fn normalize(raw: &str, schema: &ResponseSchema) -> NormalizedResult {
    run_tiers(raw, schema).with_schema_counts(schema)
}

fn run_tiers(raw: &str, schema: &ResponseSchema) -> NormalizedResult {
    let mut trace = NormalizeTrace::new(raw);

    // ── Tier 1 ──
    if let Some(fields) = strict::parse(raw, schema, &mut trace) {
        trace.record(Tier::Strict, true, "parsed as JSON");
        debug!(raw_len = raw.len(), "model reply parsed as JSON");
        return finish(fields, ParseStatus::Success, None, trace);
    }
    trace.record(Tier::Strict, false, "no parseable JSON object or array");

    // ── Tier 2 ──
    let fields = sections::extract(raw, schema);
    let found = populated(&fields);
    if !found.is_empty() {
        trace.record(Tier::Sections, true, format!("headings found for {}", found.join(", ")));
        warn!(fields = ?found, "model reply was not JSON; recovered fields from headings");
        return finish(fields, ParseStatus::FallbackUsed, Some(FALLBACK_WARNING), trace);
    }
    trace.record(Tier::Sections, false, "no heading matched");

    // ── Tier 3 ──
    let fields = linescan::extract(raw, schema);
    let found = populated(&fields);
    if !found.is_empty() {
        trace.record(Tier::LineScan, true, format!("heading lines found for {}", found.join(", ")));
        warn!(fields = ?found, "model reply was not JSON; recovered fields by line scan");
        return finish(fields, ParseStatus::FallbackUsed, Some(FALLBACK_WARNING), trace);
    }
    trace.record(Tier::LineScan, false, "no heading line matched");

    // ── Tier 4 ──
    trace.record(Tier::Passthrough, true, "returning raw text");
    warn!(raw_len = raw.len(), "model reply could not be parsed; passing raw text through");
    NormalizedResult {
        fields: schema.empty_fields(),
        parse_status: ParseStatus::Failed,
        warning: Some(FAILED_WARNING.to_string()),
        user_note: Some(FAILED_NOTE.to_string()),
        raw_response: Some(raw.to_string()),
        trace,
    }
}

fn populated(fields: &Map<String, Value>) -> Vec<String> {
    fields
        .iter()
        .filter(|(_, v)| !is_empty_value(v))
        .map(|(k, _)| k.clone())
        .collect()
}

fn finish(
    fields: Map<String, Value>,
    status: ParseStatus,
    warning: Option<&str>,
    mut trace: NormalizeTrace,
) -> NormalizedResult {
    trace.populated = populated(&fields);
    NormalizedResult {
        fields,
        parse_status: status,
        warning: warning.map(str::to_string),
        user_note: (status == ParseStatus::FallbackUsed).then(|| FALLBACK_NOTE.to_string()),
        raw_response: None,
        trace,
    }
}

impl NormalizedResult {
    /// Enforce the declared key set and note short object lists.
    fn with_schema_counts(mut self, schema: &ResponseSchema) -> Self {
        let mut fields = Map::new();
        for spec in &schema.fields {
            let value = self
                .fields
                .remove(&spec.name)
                .unwrap_or_else(|| spec.empty_value());
            fields.insert(spec.name.clone(), value);
        }
        self.fields = fields;

        if self.parse_status == ParseStatus::Failed {
            return self;
        }

        let shortfalls: Vec<String> = schema
            .fields
            .iter()
            .filter_map(|spec| {
                let expected = spec.expected_items?;
                let received = self.fields.get(&spec.name)?.as_array()?.len();
                (received < expected).then(|| {
                    format!(
                        "expected {expected} {}, received {received}",
                        spec.label.to_lowercase()
                    )
                })
            })
            .collect();

        if !shortfalls.is_empty() {
            let note = format!("AI response incomplete: {}.", shortfalls.join("; "));
            warn!(%note, "object list shorter than requested");
            self.warning = Some(match self.warning.take() {
                Some(existing) => format!("{existing} {note}"),
                None => note,
            });
        }
        self
    }
}
