//! The tool catalog: which tools exist, what shape each returns, and which
//! session slots they read or write.

use ritualcraft_config::ToolConfig;
use ritualcraft_normalizer::{FieldSpec, ResponseSchema};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// One runnable tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub schema: ResponseSchema,
    /// Tool-specific system instructions sent after the format instruction.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_instructions: Vec<String>,
    /// Field saved to the caller's session slot of the same name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stores: Option<String>,
    /// Session slot injected into the caller's fields before assembly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loads: Option<String>,
}

impl ToolSpec {
    fn new(name: &str, description: &str, schema: ResponseSchema) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            extra_instructions: Vec::new(),
            stores: None,
            loads: None,
        }
    }

    fn instructing(mut self, text: &str) -> Self {
        self.extra_instructions.push(text.into());
        self
    }

    fn storing(mut self, slot: &str) -> Self {
        self.stores = Some(slot.into());
        self
    }

    fn loading(mut self, slot: &str) -> Self {
        self.loads = Some(slot.into());
        self
    }

    /// Every system instruction block for this tool, format rules first.
    pub fn instructions(&self) -> Vec<String> {
        std::iter::once(self.schema.format_instruction())
            .chain(self.extra_instructions.iter().cloned())
            .collect()
    }
}

impl From<&ToolConfig> for ToolSpec {
    fn from(config: &ToolConfig) -> Self {
        Self {
            name: config.name.clone(),
            description: config.description.clone(),
            schema: config.schema.clone(),
            extra_instructions: config.instructions.clone(),
            stores: config.stores.clone(),
            loads: config.loads.clone(),
        }
    }
}

/// Tools by name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tools: BTreeMap<String, ToolSpec>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The eleven built-in tools.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for tool in builtin_tools() {
            catalog.insert(tool);
        }
        catalog
    }

    /// Built-ins plus config-declared tools; a configured tool replaces the
    /// built-in of the same name.
    pub fn with_overrides(tools: &[ToolConfig]) -> Self {
        let mut catalog = Self::builtin();
        for config in tools {
            if catalog.tools.contains_key(&config.name) {
                info!(tool = %config.name, "Configured tool overrides built-in");
            }
            catalog.insert(ToolSpec::from(config));
        }
        catalog
    }

    pub fn insert(&mut self, tool: ToolSpec) {
        self.tools.insert(tool.name.clone(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    /// All tools, ordered by name.
    pub fn list(&self) -> Vec<&ToolSpec> {
        self.tools.values().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

// ── Built-ins ─────────────────────────────────────────────────────────────

fn builtin_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new(
            "play_builder",
            "Turns a quarterly goal into a concrete play",
            ResponseSchema::object(vec![
                FieldSpec::text("play_title", "Play Title").with_aliases(&["Title"]),
                FieldSpec::text("objective", "Objective").with_aliases(&["Goal"]),
                FieldSpec::text_list("steps", "Steps"),
                FieldSpec::text_list("success_signals", "Success Signals"),
                FieldSpec::text_list("risks", "Risks"),
            ]),
        ),
        ToolSpec::new(
            "signal_lab",
            "Reads a market or team signal and suggests a response",
            ResponseSchema::object(vec![
                FieldSpec::text("signal_summary", "Signal Summary").with_aliases(&["Summary"]),
                FieldSpec::text("why_it_matters", "Why It Matters"),
                FieldSpec::text("possible_next_step", "Possible Next Step")
                    .with_aliases(&["Next Step"]),
            ]),
        ),
        ToolSpec::new(
            "ritual_guide",
            "Designs a team ritual with agenda and facilitation tips",
            ResponseSchema::object(vec![
                FieldSpec::text("ritual_name", "Ritual Name"),
                FieldSpec::text("purpose", "Purpose"),
                FieldSpec::text_list("agenda", "Agenda"),
                FieldSpec::text_list("facilitator_tips", "Facilitator Tips")
                    .with_aliases(&["Tips"]),
                FieldSpec::text("duration", "Duration"),
            ]),
        ),
        ToolSpec::new(
            "persona_lineup",
            "Drafts five customer personas for later focus groups",
            ResponseSchema::object(vec![
                FieldSpec::object_list(
                    "personas",
                    "Personas",
                    &["name", "role", "motivation", "frustration"],
                )
                .expecting(5),
            ]),
        )
        .instructing("Make every persona distinct in role and motivation.")
        .storing("personas"),
        ToolSpec::new(
            "focus_group",
            "Simulates how the saved personas react to an idea",
            ResponseSchema::object(vec![
                FieldSpec::object_list("reactions", "Reactions", &["persona", "reaction", "concern"]),
                FieldSpec::text("consensus", "Consensus"),
                FieldSpec::text_list("open_questions", "Open Questions"),
            ]),
        )
        .instructing("Give one reaction per persona listed in the input.")
        .loading("personas"),
        ToolSpec::new(
            "tension_mapper",
            "Maps the tensions a team must balance",
            ResponseSchema::array(FieldSpec::object_list(
                "tensions",
                "Tensions",
                &["tension", "pole_a", "pole_b", "recommendation"],
            )),
        ),
        ToolSpec::new(
            "experiment_designer",
            "Designs a lightweight experiment to test a bet",
            ResponseSchema::object(vec![
                FieldSpec::text("hypothesis", "Hypothesis"),
                FieldSpec::text("method", "Method"),
                FieldSpec::number("target_sample", "Target Sample")
                    .with_aliases(&["Sample Size"]),
                FieldSpec::text_list("success_metrics", "Success Metrics"),
                FieldSpec::text("duration", "Duration"),
            ]),
        )
        .instructing("target_sample must be a plain number of participants."),
        ToolSpec::new(
            "timeframe_planner",
            "Lays out milestones across the quarter",
            ResponseSchema::object(vec![
                FieldSpec::object_list("milestones", "Milestones", &["milestone", "target_date", "owner"]),
                FieldSpec::text_list("critical_path", "Critical Path"),
            ]),
        ),
        ToolSpec::new(
            "assumption_audit",
            "Lists the assumptions behind a plan and how to test them",
            ResponseSchema::object(vec![FieldSpec::object_list(
                "assumptions",
                "Assumptions",
                &["assumption", "confidence", "test"],
            )]),
        ),
        ToolSpec::new(
            "headline_generator",
            "Writes candidate headlines for a quarterly update",
            ResponseSchema::object(vec![
                FieldSpec::text_list("headlines", "Headlines"),
                FieldSpec::text("recommended", "Recommended").with_aliases(&["Top Pick"]),
            ]),
        ),
        ToolSpec::new(
            "retro_synthesizer",
            "Condenses retrospective notes into themes and actions",
            ResponseSchema::object(vec![
                FieldSpec::text_list("went_well", "Went Well"),
                FieldSpec::text_list("to_improve", "To Improve")
                    .with_aliases(&["Didn't Go Well"]),
                FieldSpec::text_list("action_items", "Action Items"),
                FieldSpec::text("theme", "Theme"),
            ]),
        ),
    ]
}
