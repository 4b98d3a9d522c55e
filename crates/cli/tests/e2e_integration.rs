//! End-to-end integration tests for the Ritualcraft tool pipeline.
//!
//! These tests exercise the full path a tool request takes: template store
//! → prompt assembly → (scripted) model → normalization → flattened JSON.

use std::collections::BTreeSet;
use std::sync::Arc;

use ritualcraft_config::AppConfig;
use ritualcraft_core::error::ProviderError;
use ritualcraft_core::message::Role;
use ritualcraft_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use ritualcraft_core::template::{PromptTemplate, TemplateStore};
use ritualcraft_normalizer::schema::RESERVED_KEYS;
use ritualcraft_pipeline::{Catalog, ToolRunner};
use ritualcraft_store::{InMemorySessionStore, InMemoryTemplateStore, parse_seed, seed_store};
use serde_json::{Map, Value, json};

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted replies in sequence and records
/// what it was asked.
struct ScriptedProvider {
    responses: std::sync::Mutex<Vec<String>>,
    requests: std::sync::Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(responses: &[&str]) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn text(response: &str) -> Self {
        Self::new(&[response])
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, n: usize) -> ProviderRequest {
        self.requests.lock().unwrap()[n].clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let call = requests.len();
        if call >= responses.len() {
            panic!(
                "ScriptedProvider exhausted: call #{}, have {}",
                call,
                responses.len()
            );
        }
        requests.push(request);
        Ok(ProviderResponse {
            content: responses[call].clone(),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "mock".into(),
        })
    }
}

const SEED: &str = r#"
[[templates]]
tool_name = "play_builder"
model = "gpt-4o"
prompt_text = "Build a play for the goal: {{goal}}. Team: {{team}}."

[[templates]]
tool_name = "signal_lab"
model = "gpt-4o-mini"
temperature = 0.3
prompt_text = "Interpret this signal: {{signal}}"

[[templates]]
tool_name = "experiment_designer"
model = "gpt-4o-mini"
prompt_text = "Design an experiment for {{bet}}"

[[templates]]
tool_name = "tension_mapper"
model = "gpt-4o-mini"
prompt_text = "Map tensions in {{context}}"

[[templates]]
tool_name = "persona_lineup"
model = ""
prompt_text = "Five personas for {{product}}"

[[templates]]
tool_name = "focus_group"
model = "gpt-4o-mini"
prompt_text = "Run a focus group on {{idea}} with: {{personas}}"
"#;

async fn seeded_store() -> Arc<InMemoryTemplateStore> {
    let store = Arc::new(InMemoryTemplateStore::new());
    seed_store(store.as_ref(), parse_seed(SEED).unwrap())
        .await
        .unwrap();
    store
}

async fn runner(provider: Arc<ScriptedProvider>) -> ToolRunner {
    ToolRunner::new(
        Catalog::builtin(),
        seeded_store().await,
        Arc::new(InMemorySessionStore::new()),
        provider,
    )
    .with_default_model("default-model")
}

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

// ── E2E: Conforming replies ──────────────────────────────────────────────

#[tokio::test]
async fn e2e_play_builder_fenced_json() {
    let provider = Arc::new(ScriptedProvider::text(
        "```json\n{\"play_title\": \"Win back churned teams\", \"objective\": \"Recover 20 accounts\", \"steps\": [\"List accounts\", \"Call owners\"], \"success_signals\": [\"Meetings booked\"], \"risks\": []}\n```",
    ));
    let runner = runner(provider.clone()).await;

    let outcome = runner
        .run(
            "play_builder",
            "alice",
            fields(json!({"goal": "reduce churn", "team": {"label": "Growth"}})),
        )
        .await
        .expect("run should succeed");

    let flat = outcome.to_flat_json();
    assert_eq!(flat["parse_status"], "success");
    assert_eq!(flat["play_title"], "Win back churned teams");
    assert_eq!(flat["steps"], json!(["List accounts", "Call owners"]));
    assert!(flat.get("warning").is_none());

    let request = provider.request(0);
    assert_eq!(request.model, "gpt-4o");
    assert_eq!(
        request.messages[0].content,
        "Build a play for the goal: reduce churn. Team: Growth."
    );
    assert_eq!(request.messages.last().unwrap().role, Role::User);
    assert!(
        request
            .messages
            .iter()
            .all(|m| !m.content.contains("{{"))
    );
    assert_eq!(outcome.assembly.substituted, vec!["goal", "team"]);
}

#[tokio::test]
async fn e2e_template_params_reach_the_model() {
    let provider = Arc::new(ScriptedProvider::text(
        r#"{"signal_summary": "a", "why_it_matters": "b", "possible_next_step": "c"}"#,
    ));
    let runner = runner(provider.clone()).await;
    runner
        .run("signal_lab", "alice", fields(json!({"signal": "NPS fell"})))
        .await
        .unwrap();

    let request = provider.request(0);
    assert!((request.params.temperature - 0.3).abs() < f32::EPSILON);
    assert_eq!(request.params.max_tokens, 1500);
}

#[tokio::test]
async fn e2e_quoted_sample_size_becomes_a_number() {
    let provider = Arc::new(ScriptedProvider::text(
        r#"{"hypothesis": "Onboarding emails lift activation", "method": "A/B", "target_sample": "5000", "success_metrics": ["activation"], "duration": "2 weeks"}"#,
    ));
    let runner = runner(provider).await;

    let outcome = runner
        .run("experiment_designer", "alice", Map::new())
        .await
        .unwrap();
    let flat = outcome.to_flat_json();
    assert_eq!(flat["parse_status"], "success");
    assert_eq!(flat["target_sample"], json!(5000));
}

#[tokio::test]
async fn e2e_numeric_keyed_tensions_become_a_list() {
    let provider = Arc::new(ScriptedProvider::text(
        r#"{"0": {"tension": "speed vs quality"}, "1": {"tension": "focus vs reach"}}"#,
    ));
    let runner = runner(provider).await;

    let outcome = runner
        .run("tension_mapper", "alice", Map::new())
        .await
        .unwrap();
    assert_eq!(
        outcome.result.fields["tensions"],
        json!([{"tension": "speed vs quality"}, {"tension": "focus vs reach"}])
    );
}

// ── E2E: Degraded replies ────────────────────────────────────────────────

#[tokio::test]
async fn e2e_heading_reply_falls_back() {
    let provider = Arc::new(ScriptedProvider::text("**Signal Summary**: foo"));
    let runner = runner(provider).await;

    let flat = runner
        .run("signal_lab", "alice", Map::new())
        .await
        .unwrap()
        .to_flat_json();

    assert_eq!(flat["parse_status"], "fallback_used");
    assert_eq!(flat["signal_summary"], "foo");
    assert_eq!(flat["why_it_matters"], "");
    assert_eq!(flat["possible_next_step"], "");
    assert!(flat["warning"].is_string());
    assert!(flat["user_note"].is_string());
    assert!(flat.get("raw_response").is_none());
}

#[tokio::test]
async fn e2e_refusal_passes_raw_text() {
    let provider = Arc::new(ScriptedProvider::text("I'm unable to help with that request."));
    let runner = runner(provider).await;

    let flat = runner
        .run("play_builder", "alice", Map::new())
        .await
        .unwrap()
        .to_flat_json();

    assert_eq!(flat["parse_status"], "failed");
    assert_eq!(flat["raw_response"], "I'm unable to help with that request.");
    assert_eq!(flat["play_title"], "");
    assert_eq!(flat["steps"], json!([]));
}

#[tokio::test]
async fn e2e_truncated_lineup_feeds_focus_group() {
    let provider = Arc::new(ScriptedProvider::new(&[
        r#"{"personas": [
            {"name": "Ava", "role": "PM", "motivation": "clarity", "frustration": "churn"},
            {"name": "Ben", "role": "Engineer", "motivation": "focus", "frustration": "meetings"},
            {"name": "Cy", "role": "Designer", "motivation": "craft", "frustration": "rework"},
            {"name": "Di", "role": "Sal"#,
        r#"{"reactions": [{"persona": "Ava", "reaction": "keen", "concern": "cost"}], "consensus": "cautious yes", "open_questions": ["pricing?"]}"#,
    ]));
    let runner = runner(provider.clone()).await;

    let lineup = runner
        .run("persona_lineup", "alice", fields(json!({"product": "Ritualcraft"})))
        .await
        .unwrap();
    assert_eq!(lineup.result.fields["personas"].as_array().unwrap().len(), 3);
    let warning = lineup.result.warning.clone().unwrap();
    assert!(warning.contains("expected 5"), "{warning}");
    assert!(warning.contains("received 3"), "{warning}");
    assert_eq!(provider.request(0).model, "default-model");

    let group = runner
        .run("focus_group", "alice", fields(json!({"idea": "async standups"})))
        .await
        .unwrap();
    assert_eq!(group.to_flat_json()["consensus"], "cautious yes");
    assert_eq!(
        provider.request(1).messages[0].content,
        "Run a focus group on async standups with: \
         Ava (frustration: churn, motivation: clarity, role: PM), \
         Ben (frustration: meetings, motivation: focus, role: Engineer), \
         Cy (frustration: rework, motivation: craft, role: Designer)"
    );
    assert_eq!(provider.calls(), 2);
}

// ── E2E: Shape invariant across the catalog ──────────────────────────────

#[tokio::test]
async fn e2e_every_tool_returns_exactly_its_keys() {
    let replies = [
        "",
        "Sorry, no.",
        "{\"unexpected\": true}",
        "[1, 2, 3]",
        "## Heading\n- item one\n- item two",
        "{\"truncated\": \"va",
    ];
    let catalog = Catalog::builtin();

    for tool in catalog.list() {
        let declared: BTreeSet<String> = tool.schema.fields.iter().map(|f| f.name.clone()).collect();
        for raw in replies {
            let result = ritualcraft_normalizer::normalize(raw, &tool.schema);
            let keys: BTreeSet<String> = result.fields.keys().cloned().collect();
            assert_eq!(keys, declared, "tool {} reply {raw:?}", tool.name);

            let flat = result.to_flat_json();
            let extra: Vec<&String> = flat
                .as_object()
                .unwrap()
                .keys()
                .filter(|k| !declared.contains(*k))
                .collect();
            assert!(
                extra.iter().all(|k| RESERVED_KEYS.contains(&k.as_str())),
                "tool {} leaked {extra:?}",
                tool.name
            );
        }
    }
}

// ── E2E: Storage backends and config ─────────────────────────────────────

#[tokio::test]
async fn e2e_sqlite_templates_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("templates.db").display());

    {
        let store = ritualcraft_store::SqliteTemplateStore::new(&url).await.unwrap();
        seed_store(&store, parse_seed(SEED).unwrap()).await.unwrap();
    }

    let store = Arc::new(ritualcraft_store::SqliteTemplateStore::new(&url).await.unwrap());
    assert_eq!(store.list().await.unwrap().len(), 6);

    let provider = Arc::new(ScriptedProvider::text(
        r#"{"signal_summary": "s", "why_it_matters": "w", "possible_next_step": "n"}"#,
    ));
    let runner = ToolRunner::new(
        Catalog::builtin(),
        store,
        Arc::new(InMemorySessionStore::new()),
        provider.clone(),
    );
    let outcome = runner
        .run("signal_lab", "alice", fields(json!({"signal": "usage spike"})))
        .await
        .unwrap();
    assert_eq!(outcome.result.fields["signal_summary"], "s");
    assert_eq!(
        provider.request(0).messages[0].content,
        "Interpret this signal: usage spike"
    );
}

#[tokio::test]
async fn e2e_configured_tool_runs_through_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[[tools]]
name = "risk_radar"
description = "Top delivery risks"
instructions = ["Rank by likelihood."]

[[tools.schema.fields]]
name = "risks"
label = "Risks"
kind = "text_list"

[[tools.schema.fields]]
name = "owner"
label = "Owner"
kind = "text"
"#,
    )
    .unwrap();
    let config = AppConfig::load_from(&path).unwrap();

    let templates = Arc::new(InMemoryTemplateStore::with_templates([PromptTemplate::new(
        "risk_radar",
        "Risks for {{project}}",
        "gpt-4o-mini",
    )]));
    let provider = Arc::new(ScriptedProvider::text("Risks:\n- vendor delay\n- hiring\nOwner: Priya"));
    let runner = ToolRunner::new(
        Catalog::with_overrides(&config.tools),
        templates,
        Arc::new(InMemorySessionStore::new()),
        provider.clone(),
    );

    let flat = runner
        .run("risk_radar", "alice", fields(json!({"project": "Atlas"})))
        .await
        .unwrap()
        .to_flat_json();

    assert_eq!(flat["parse_status"], "fallback_used");
    assert_eq!(flat["risks"], json!(["vendor delay", "hiring"]));
    assert_eq!(flat["owner"], "Priya");

    let request = provider.request(0);
    assert!(request.messages.iter().any(|m| m.content == "Rank by likelihood."));
}
