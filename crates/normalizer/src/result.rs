//! The normalizer's output: fields, a trust tag, and a structured trace.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Warning attached when fields were recovered by the heading-based tiers.
pub const FALLBACK_WARNING: &str =
    "AI response was not valid JSON; fields were extracted heuristically.";

/// Warning attached when nothing could be recovered.
pub const FAILED_WARNING: &str = "AI response could not be parsed; returning raw text only.";

/// User-facing note for heuristically extracted results.
pub const FALLBACK_NOTE: &str =
    "This result was reconstructed from an unstructured AI reply and is shown as best-effort text.";

/// User-facing note for raw passthrough results.
pub const FAILED_NOTE: &str =
    "The AI reply could not be organized into sections; the original text is shown instead.";

/// How the normalizer obtained its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    /// The reply parsed as JSON.
    Success,
    /// Fields were pulled out of prose by heading or line scanning.
    FallbackUsed,
    /// Nothing usable; the raw text is passed through.
    Failed,
}

impl ParseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseStatus::Success => "success",
            ParseStatus::FallbackUsed => "fallback_used",
            ParseStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ParseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four extraction tiers, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Strict,
    Sections,
    LineScan,
    Passthrough,
}

/// What one tier did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierAttempt {
    pub tier: Tier,
    /// Whether this tier produced the result.
    pub accepted: bool,
    pub detail: String,
}

/// A record of how a single `normalize` call reached its result.
///
/// Returned to the caller instead of being stashed in process-wide state;
/// callers may log it or drop it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizeTrace {
    /// Length of the raw reply in bytes.
    pub raw_len: usize,
    /// Pre-parse rewrites applied before strict parsing.
    pub rewrites: Vec<String>,
    pub attempts: Vec<TierAttempt>,
    /// Fields that ended up non-empty.
    pub populated: Vec<String>,
}

impl NormalizeTrace {
    pub(crate) fn new(raw: &str) -> Self {
        Self {
            raw_len: raw.len(),
            ..Self::default()
        }
    }

    pub(crate) fn record(&mut self, tier: Tier, accepted: bool, detail: impl Into<String>) {
        self.attempts.push(TierAttempt {
            tier,
            accepted,
            detail: detail.into(),
        });
    }

    /// The tier that produced the result.
    pub fn accepted_tier(&self) -> Option<Tier> {
        self.attempts.iter().find(|a| a.accepted).map(|a| a.tier)
    }
}

/// A best-effort structured object plus how far it can be trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResult {
    /// Exactly the schema's declared keys.
    pub fields: Map<String, Value>,

    pub parse_status: ParseStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_note: Option<String>,

    /// The untouched reply, present only when `parse_status` is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,

    #[serde(default)]
    pub trace: NormalizeTrace,
}

impl NormalizedResult {
    /// The caller-facing shape: fields flattened beside the status keys so
    /// consumers read fields directly without unwrapping.
    pub fn to_flat_json(&self) -> Value {
        let mut flat = self.fields.clone();
        flat.insert(
            "parse_status".into(),
            Value::String(self.parse_status.as_str().into()),
        );
        if let Some(warning) = &self.warning {
            flat.insert("warning".into(), Value::String(warning.clone()));
        }
        if let Some(note) = &self.user_note {
            flat.insert("user_note".into(), Value::String(note.clone()));
        }
        if let Some(raw) = &self.raw_response {
            flat.insert("raw_response".into(), Value::String(raw.clone()));
        }
        Value::Object(flat)
    }

    /// Whether every declared field is empty.
    pub fn is_empty(&self) -> bool {
        self.fields.values().all(is_empty_value)
    }
}

pub(crate) fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_json_places_status_beside_fields() {
        let mut fields = Map::new();
        fields.insert("headline".into(), json!("Ship it"));
        let result = NormalizedResult {
            fields,
            parse_status: ParseStatus::FallbackUsed,
            warning: Some(FALLBACK_WARNING.into()),
            user_note: Some(FALLBACK_NOTE.into()),
            raw_response: None,
            trace: NormalizeTrace::default(),
        };
        let flat = result.to_flat_json();
        assert_eq!(flat["headline"], "Ship it");
        assert_eq!(flat["parse_status"], "fallback_used");
        assert_eq!(flat["warning"], FALLBACK_WARNING);
        assert!(flat.get("raw_response").is_none());
    }

    #[test]
    fn empty_detection() {
        assert!(is_empty_value(&json!("  ")));
        assert!(is_empty_value(&json!([])));
        assert!(!is_empty_value(&json!(0)));
        assert!(!is_empty_value(&json!(["a"])));
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&ParseStatus::FallbackUsed).unwrap(), "\"fallback_used\"");
        assert_eq!(ParseStatus::Failed.to_string(), "failed");
    }
}
