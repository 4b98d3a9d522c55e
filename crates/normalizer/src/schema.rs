//! Declarative response schemas.
//!
//! A [`ResponseSchema`] is the contract the normalizer must satisfy for one
//! tool: an ordered list of named fields, each with a kind and a
//! human-readable label. The label doubles as the section heading the
//! fallback tiers look for when the model ignores the JSON instruction.

use serde::{Deserialize, Serialize};

/// Keys the flattened caller-facing object reserves for status reporting.
pub const RESERVED_KEYS: [&str; 4] = ["parse_status", "warning", "user_note", "raw_response"];

/// The kind of value a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// A scalar string.
    Text,
    /// A scalar number. Quoted numerals are rewritten before parsing.
    Number,
    /// A list of strings.
    TextList,
    /// A list of objects with the field's declared subfields.
    ObjectList,
}

impl FieldKind {
    pub fn is_list(&self) -> bool {
        matches!(self, FieldKind::TextList | FieldKind::ObjectList)
    }
}

/// One declared field of a response schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Key in the normalized output (e.g. `signal_summary`)
    pub name: String,

    /// Human-readable heading (e.g. `Signal Summary`)
    pub label: String,

    pub kind: FieldKind,

    /// Subfield names for `object_list` fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subfields: Vec<String>,

    /// How many items an `object_list` field is supposed to contain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_items: Option<usize>,

    /// Alternative headings/keys the model tends to use
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl FieldSpec {
    fn new(name: &str, label: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind,
            subfields: Vec::new(),
            expected_items: None,
            aliases: Vec::new(),
        }
    }

    pub fn text(name: &str, label: &str) -> Self {
        Self::new(name, label, FieldKind::Text)
    }

    pub fn number(name: &str, label: &str) -> Self {
        Self::new(name, label, FieldKind::Number)
    }

    pub fn text_list(name: &str, label: &str) -> Self {
        Self::new(name, label, FieldKind::TextList)
    }

    pub fn object_list(name: &str, label: &str, subfields: &[&str]) -> Self {
        let mut spec = Self::new(name, label, FieldKind::ObjectList);
        spec.subfields = subfields.iter().map(|s| s.to_string()).collect();
        spec
    }

    /// Declare the number of items this list should contain.
    pub fn expecting(mut self, count: usize) -> Self {
        self.expected_items = Some(count);
        self
    }

    /// Add alternative headings.
    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Every token that may introduce this field as a heading or key,
    /// longest first, deduplicated case-insensitively.
    pub fn heading_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = Vec::new();
        let candidates = [self.label.clone(), self.name.clone(), self.name.replace('_', " ")]
            .into_iter()
            .chain(self.aliases.iter().cloned());
        for candidate in candidates {
            let candidate = candidate.trim().to_string();
            if candidate.is_empty() {
                continue;
            }
            if !tokens.iter().any(|t| t.eq_ignore_ascii_case(&candidate)) {
                tokens.push(candidate);
            }
        }
        tokens.sort_by(|a, b| b.len().cmp(&a.len()));
        tokens
    }

    /// Whether a JSON key refers to this field.
    pub(crate) fn matches_key(&self, key: &str) -> bool {
        if key == self.name {
            return true;
        }
        let wanted = squash(key);
        !wanted.is_empty()
            && (squash(&self.name) == wanted
                || squash(&self.label) == wanted
                || self.aliases.iter().any(|a| squash(a) == wanted))
    }

    /// The empty value for this field: `""` for scalars, `[]` for lists.
    pub fn empty_value(&self) -> serde_json::Value {
        if self.kind.is_list() {
            serde_json::Value::Array(Vec::new())
        } else {
            serde_json::Value::String(String::new())
        }
    }

    fn shape_hint(&self) -> String {
        match self.kind {
            FieldKind::Text => "\"string\"".into(),
            FieldKind::Number => "0".into(),
            FieldKind::TextList => "[\"string\"]".into(),
            FieldKind::ObjectList => format!("[{}]", object_hint(&self.subfields)),
        }
    }
}

/// The top-level JSON shape the model is asked to return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaRoot {
    /// A JSON object keyed by field name.
    #[default]
    Object,
    /// A bare JSON array that fills the schema's single list field.
    Array,
}

/// The output contract of one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSchema {
    #[serde(default)]
    pub root: SchemaRoot,

    pub fields: Vec<FieldSpec>,
}

impl ResponseSchema {
    /// A schema whose reply is a JSON object.
    pub fn object(fields: Vec<FieldSpec>) -> Self {
        Self {
            root: SchemaRoot::Object,
            fields,
        }
    }

    /// A schema whose reply is a bare JSON array stored under `field`.
    pub fn array(field: FieldSpec) -> Self {
        Self {
            root: SchemaRoot::Array,
            fields: vec![field],
        }
    }

    /// Check structural rules: unique non-reserved names, and exactly one
    /// list field for array-rooted schemas.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.fields.is_empty() {
            return Err(SchemaError::Empty);
        }
        for (i, field) in self.fields.iter().enumerate() {
            if field.name.trim().is_empty() {
                return Err(SchemaError::BlankName(i));
            }
            if RESERVED_KEYS.contains(&field.name.as_str()) {
                return Err(SchemaError::ReservedName(field.name.clone()));
            }
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
            if field.expected_items.is_some() && field.kind != FieldKind::ObjectList {
                return Err(SchemaError::UnexpectedCount(field.name.clone()));
            }
        }
        if self.root == SchemaRoot::Array
            && (self.fields.len() != 1 || !self.fields[0].kind.is_list())
        {
            return Err(SchemaError::ArrayRoot);
        }
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The single list field, if the schema has exactly one.
    pub(crate) fn sole_list_field(&self) -> Option<usize> {
        let mut lists = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.kind.is_list());
        match (lists.next(), lists.next()) {
            (Some((i, _)), None) => Some(i),
            _ => None,
        }
    }

    /// The single object-list field, if the schema has exactly one.
    pub(crate) fn sole_object_list(&self) -> Option<usize> {
        let mut lists = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.kind == FieldKind::ObjectList);
        match (lists.next(), lists.next()) {
            (Some((i, _)), None) => Some(i),
            _ => None,
        }
    }

    /// A map holding every declared key with its empty value.
    pub fn empty_fields(&self) -> serde_json::Map<String, serde_json::Value> {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.empty_value()))
            .collect()
    }

    /// The output-format instruction appended to every prompt for this
    /// schema: declares the exact shape and forbids markdown fencing.
    pub fn format_instruction(&self) -> String {
        let shape = match self.root {
            SchemaRoot::Object => {
                let keys: Vec<String> = self
                    .fields
                    .iter()
                    .map(|f| format!("\"{}\": {}", f.name, f.shape_hint()))
                    .collect();
                format!("a single raw JSON object with exactly these keys: {{{}}}", keys.join(", "))
            }
            SchemaRoot::Array => {
                let item = self
                    .fields
                    .first()
                    .map(|f| object_hint(&f.subfields))
                    .unwrap_or_else(|| "{}".into());
                format!("a single raw JSON array whose items look like: {item}")
            }
        };
        let mut instruction = format!(
            "Respond with {shape}. Do not wrap the JSON in markdown code fences and do not add any text before or after it."
        );
        for field in &self.fields {
            if let Some(count) = field.expected_items {
                instruction.push_str(&format!(
                    " \"{}\" must contain exactly {count} items.",
                    field.name
                ));
            }
        }
        instruction
    }
}

fn object_hint(subfields: &[String]) -> String {
    let keys: Vec<String> = subfields.iter().map(|s| format!("\"{s}\": \"string\"")).collect();
    format!("{{{}}}", keys.join(", "))
}

/// Lowercase alphanumerics only: `"Why It Matters"` → `whyitmatters`.
pub(crate) fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Structural problems in a schema definition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("schema declares no fields")]
    Empty,

    #[error("field #{0} has a blank name")]
    BlankName(usize),

    #[error("field name '{0}' is reserved for status reporting")]
    ReservedName(String),

    #[error("field '{0}' is declared twice")]
    DuplicateField(String),

    #[error("field '{0}' declares expected_items but is not an object list")]
    UnexpectedCount(String),

    #[error("an array-rooted schema must declare exactly one list field")]
    ArrayRoot,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal_schema() -> ResponseSchema {
        ResponseSchema::object(vec![
            FieldSpec::text("signal_summary", "Signal Summary"),
            FieldSpec::text("why_it_matters", "Why It Matters"),
            FieldSpec::text("possible_next_step", "Possible Next Step"),
        ])
    }

    #[test]
    fn empty_fields_cover_every_key() {
        let schema = ResponseSchema::object(vec![
            FieldSpec::text("title", "Title"),
            FieldSpec::text_list("steps", "Steps"),
        ]);
        let empty = schema.empty_fields();
        assert_eq!(empty.len(), 2);
        assert_eq!(empty["title"], "");
        assert_eq!(empty["steps"], serde_json::json!([]));
    }

    #[test]
    fn heading_tokens_dedupe_and_sort_longest_first() {
        let field = FieldSpec::text("why_it_matters", "Why It Matters").with_aliases(&["Why"]);
        let tokens = field.heading_tokens();
        assert_eq!(tokens, vec!["Why It Matters", "why_it_matters", "Why"]);
    }

    #[test]
    fn key_matching_ignores_case_and_punctuation() {
        let field = FieldSpec::text("signal_summary", "Signal Summary");
        assert!(field.matches_key("signal_summary"));
        assert!(field.matches_key("Signal Summary"));
        assert!(field.matches_key("signalSummary"));
        assert!(!field.matches_key("summary"));
    }

    #[test]
    fn validate_rejects_bad_schemas() {
        assert_eq!(ResponseSchema::object(vec![]).validate(), Err(SchemaError::Empty));

        let dup = ResponseSchema::object(vec![
            FieldSpec::text("a", "A"),
            FieldSpec::text("a", "A again"),
        ]);
        assert!(matches!(dup.validate(), Err(SchemaError::DuplicateField(_))));

        let reserved = ResponseSchema::object(vec![FieldSpec::text("warning", "Warning")]);
        assert!(matches!(reserved.validate(), Err(SchemaError::ReservedName(_))));

        let bad_array = ResponseSchema {
            root: SchemaRoot::Array,
            fields: vec![FieldSpec::text("a", "A")],
        };
        assert_eq!(bad_array.validate(), Err(SchemaError::ArrayRoot));

        assert!(signal_schema().validate().is_ok());
    }

    #[test]
    fn format_instruction_declares_keys_and_forbids_fences() {
        let text = signal_schema().format_instruction();
        assert!(text.contains("\"signal_summary\": \"string\""));
        assert!(text.contains("code fences"));

        let personas = ResponseSchema::object(vec![
            FieldSpec::object_list("personas", "Personas", &["name", "role"]).expecting(5),
        ]);
        let text = personas.format_instruction();
        assert!(text.contains("exactly 5 items"));
        assert!(text.contains("\"name\": \"string\""));
    }

    #[test]
    fn schema_deserializes_from_data() {
        let schema = tensions_schema();
        assert_eq!(schema.root, SchemaRoot::Array);
        assert_eq!(schema.fields[0].kind, FieldKind::ObjectList);
        assert_eq!(schema.fields[0].subfields, vec!["tension"]);
    }

    fn tensions_schema() -> ResponseSchema {
        serde_json::from_value(serde_json::json!({
            "root": "array",
            "fields": [
                { "name": "tensions", "label": "Tensions", "kind": "object_list", "subfields": ["tension"] }
            ]
        }))
        .unwrap()
    }
}
