//! Prompt assembly: template substitution plus the tool's format rules.
//!
//! Produces the role-tagged message sequence sent to the model:
//!
//! 1. **System**: the stored template with `{{placeholders}}` filled in
//! 2. **System**: one message per tool instruction block
//! 3. **User**: the caller's fields as `Label: value` lines
//!
//! # Determinism
//!
//! Assembly is pure: identical inputs always produce identical messages and
//! an identical [`AssemblyTrace`]. Nothing here touches I/O or shared state.

use regex_lite::{Captures, Regex};
use ritualcraft_core::message::Message;
use ritualcraft_core::template::PromptTemplate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::warn;

static PLACEHOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{\{([^{}]*)\}\}").ok());

// ── Types ─────────────────────────────────────────────────────────────────

/// What happened while filling a template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyTrace {
    /// Placeholder keys that had a caller value.
    pub substituted: Vec<String>,
    /// Placeholder keys with no caller value; replaced by the empty string.
    pub missing: Vec<String>,
    /// `{{…}}` tokens still present after substitution.
    pub leaked: Vec<String>,
    pub message_count: usize,
}

/// The messages for one model call plus how they were built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledPrompt {
    pub messages: Vec<Message>,
    pub trace: AssemblyTrace,
}

// ── Assembly ──────────────────────────────────────────────────────────────

/// Build the message sequence for `template` from the caller's `fields`.
pub fn assemble(
    template: &PromptTemplate,
    fields: &Map<String, Value>,
    instructions: &[String],
) -> AssembledPrompt {
    let mut trace = AssemblyTrace::default();
    let system = substitute(&template.prompt_text, fields, &mut trace);

    if !trace.leaked.is_empty() {
        warn!(
            tool = %template.tool_name,
            leaked = ?trace.leaked,
            "Placeholder survived template substitution"
        );
    }

    let mut messages = Vec::with_capacity(instructions.len() + 2);
    messages.push(Message::system(system));
    messages.extend(
        instructions
            .iter()
            .filter(|block| !block.trim().is_empty())
            .map(Message::system),
    );
    messages.push(Message::user(render_fields(fields)));

    trace.message_count = messages.len();
    AssembledPrompt { messages, trace }
}

/// Replace every `{{key}}` with the string form of `fields[key]`.
fn substitute(text: &str, fields: &Map<String, Value>, trace: &mut AssemblyTrace) -> String {
    let Some(re) = PLACEHOLDER.as_ref() else {
        return text.to_string();
    };

    let filled = re
        .replace_all(text, |caps: &Captures<'_>| {
            let key = caps[1].trim();
            match fields.get(key) {
                Some(value) => {
                    push_unique(&mut trace.substituted, key);
                    value_text(value)
                }
                None => {
                    push_unique(&mut trace.missing, key);
                    String::new()
                }
            }
        })
        .into_owned();

    // Anything still shaped like a placeholder came from a caller value or a
    // malformed token such as `{{ {x} }}`.
    for m in re.find_iter(&filled) {
        push_unique(&mut trace.leaked, m.as_str());
    }
    if filled.contains("{{") && trace.leaked.is_empty() {
        trace.leaked.push("{{".into());
    }

    filled
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|s| s == item) {
        list.push(item.to_string());
    }
}

/// The plain-text form of a caller value. Label objects (`{"value": …}` or
/// `{"label": …}`) unwrap to their text; lists join with `", "`. Any other
/// object keeps every field, led by its `name` when it has one:
/// `Ava (motivation: ship, role: PM)`.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(map) => ["value", "label"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| object_text(map)),
    }
}

fn object_text(map: &Map<String, Value>) -> String {
    let name = map.get("name").map(value_text).filter(|n| !n.is_empty());
    let details = map
        .iter()
        .filter(|(key, _)| name.is_none() || key.as_str() != "name")
        .map(|(key, value)| (key, value_text(value)))
        .filter(|(_, text)| !text.is_empty())
        .map(|(key, text)| format!("{key}: {text}"))
        .collect::<Vec<_>>()
        .join(", ");

    match name {
        Some(name) if details.is_empty() => name,
        Some(name) => format!("{name} ({details})"),
        None => details,
    }
}

/// `team_size` → `Team Size`
fn label_for(key: &str) -> String {
    key.split(['_', '-'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_fields(fields: &Map<String, Value>) -> String {
    let lines: Vec<String> = fields
        .iter()
        .map(|(key, value)| (key, value_text(value)))
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(key, text)| format!("{}: {}", label_for(key), text))
        .collect();

    if lines.is_empty() {
        "No additional input provided.".into()
    } else {
        lines.join("\n")
    }
}
