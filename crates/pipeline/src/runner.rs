//! The tool runner: one parameterized handler body for every tool.
//!
//! ```text
//! catalog lookup → template fetch → session load → assemble
//!     → bounded model call → normalize → session store
//! ```
//!
//! The model call is bounded by a timeout and never retried here. Malformed
//! model output is not an error: it degrades to a fallback or failed
//! [`NormalizedResult`].

use crate::assembler::{AssemblyTrace, assemble};
use crate::catalog::{Catalog, ToolSpec};
use ritualcraft_core::error::{ProviderError, StoreError};
use ritualcraft_core::provider::{Provider, ProviderRequest, Usage};
use ritualcraft_core::session::{SessionKey, SessionStore};
use ritualcraft_core::template::TemplateStore;
use ritualcraft_normalizer::{NormalizedResult, ParseStatus, normalize};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why a tool run could not produce a result.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Model call timed out after {0}s")]
    UpstreamTimeout(u64),

    #[error("Model call failed: {0}")]
    UpstreamService(ProviderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Everything a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutcome {
    pub tool: String,
    pub result: NormalizedResult,
    pub assembly: AssemblyTrace,
    /// Model that served the request.
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ToolOutcome {
    /// The caller-facing object.
    pub fn to_flat_json(&self) -> Value {
        self.result.to_flat_json()
    }
}

/// Runs catalog tools against a template store, a session store, and a
/// model provider.
pub struct ToolRunner {
    catalog: Arc<Catalog>,
    templates: Arc<dyn TemplateStore>,
    sessions: Arc<dyn SessionStore>,
    provider: Arc<dyn Provider>,
    default_model: String,
    timeout: Duration,
    session_ttl: Duration,
}

impl ToolRunner {
    pub fn new(
        catalog: Catalog,
        templates: Arc<dyn TemplateStore>,
        sessions: Arc<dyn SessionStore>,
        provider: Arc<dyn Provider>,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog),
            templates,
            sessions,
            provider,
            default_model: "gpt-4o-mini".into(),
            timeout: Duration::from_secs(30),
            session_ttl: Duration::from_secs(60 * 60),
        }
    }

    /// Upper bound on a single model call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How long stored session values stay readable.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Model used when a template leaves `model` blank.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn templates(&self) -> &Arc<dyn TemplateStore> {
        &self.templates
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    fn tool(&self, name: &str) -> Result<&ToolSpec, PipelineError> {
        self.catalog
            .get(name)
            .ok_or_else(|| PipelineError::UnknownTool(name.to_string()))
    }

    /// Run `tool` for `user_id` with the caller's `fields`.
    pub async fn run(
        &self,
        tool: &str,
        user_id: &str,
        mut fields: Map<String, Value>,
    ) -> Result<ToolOutcome, PipelineError> {
        let spec = self.tool(tool)?;

        let template = self.templates.get(tool).await?.ok_or_else(|| {
            PipelineError::Configuration(format!("no prompt template stored for '{tool}'"))
        })?;

        if let Some(slot) = &spec.loads
            && !fields.contains_key(slot)
        {
            let key = SessionKey::new(user_id, slot.as_str());
            if let Some(value) = self.sessions.get(&key).await? {
                debug!(%key, "Loaded session value into fields");
                fields.insert(slot.clone(), value);
            }
        }

        let prompt = assemble(&template, &fields, &spec.instructions());
        let model = if template.model.trim().is_empty() {
            self.default_model.clone()
        } else {
            template.model.clone()
        };

        debug!(
            tool,
            model = %model,
            messages = prompt.trace.message_count,
            missing = ?prompt.trace.missing,
            "Calling model"
        );

        let request = ProviderRequest {
            model: model.clone(),
            messages: prompt.messages,
            params: template.params.clone(),
        };

        let response = match tokio::time::timeout(self.timeout, self.provider.complete(request)).await
        {
            Err(_) => {
                warn!(tool, timeout_secs = self.timeout.as_secs(), "Model call timed out");
                return Err(PipelineError::UpstreamTimeout(self.timeout.as_secs()));
            }
            Ok(Err(e)) if e.is_timeout() => {
                warn!(tool, error = %e, "Provider reported a timeout");
                return Err(PipelineError::UpstreamTimeout(self.timeout.as_secs()));
            }
            Ok(Err(e)) => {
                warn!(tool, error = %e, "Model call failed");
                return Err(PipelineError::UpstreamService(e));
            }
            Ok(Ok(response)) => response,
        };

        let result = normalize(&response.content, &spec.schema);
        info!(
            tool,
            status = %result.parse_status,
            tier = ?result.trace.accepted_tier(),
            "Tool run complete"
        );

        if let Some(slot) = &spec.stores {
            self.store_session_value(user_id, slot, &result).await;
        }

        Ok(ToolOutcome {
            tool: tool.to_string(),
            result,
            assembly: prompt.trace,
            model: if response.model.is_empty() {
                model
            } else {
                response.model
            },
            usage: response.usage,
        })
    }

    /// Normalize an already-obtained reply against `tool`'s schema.
    pub fn normalize_only(&self, tool: &str, raw: &str) -> Result<NormalizedResult, PipelineError> {
        Ok(normalize(raw, &self.tool(tool)?.schema))
    }

    async fn store_session_value(&self, user_id: &str, slot: &str, result: &NormalizedResult) {
        if result.parse_status == ParseStatus::Failed {
            return;
        }
        let Some(value) = result.fields.get(slot) else {
            return;
        };
        let empty = match value {
            Value::Array(items) => items.is_empty(),
            Value::String(s) => s.trim().is_empty(),
            Value::Null => true,
            _ => false,
        };
        if empty {
            return;
        }

        let key = SessionKey::new(user_id, slot);
        if let Err(e) = self
            .sessions
            .put(key.clone(), value.clone(), self.session_ttl)
            .await
        {
            warn!(%key, error = %e, "Failed to store session value");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{SequentialMockProvider, StalledProvider, make_text_response};
    use ritualcraft_core::message::Role;
    use ritualcraft_core::template::PromptTemplate;
    use ritualcraft_store::{InMemorySessionStore, InMemoryTemplateStore};
    use serde_json::json;

    fn templates() -> Arc<InMemoryTemplateStore> {
        Arc::new(InMemoryTemplateStore::with_templates([
            PromptTemplate::new("signal_lab", "Read the signal: {{signal}}", "gpt-4o"),
            PromptTemplate::new("persona_lineup", "Personas for {{product}}", ""),
            PromptTemplate::new("focus_group", "Test {{idea}} with {{personas}}", "gpt-4o"),
        ]))
    }

    fn runner(provider: Arc<dyn Provider>) -> (ToolRunner, Arc<InMemorySessionStore>) {
        let sessions = Arc::new(InMemorySessionStore::new());
        let runner = ToolRunner::new(Catalog::builtin(), templates(), sessions.clone(), provider)
            .with_default_model("fallback-model");
        (runner, sessions)
    }

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    const LINEUP: &str = r#"{"personas": [
        {"name": "Ava", "role": "PM", "motivation": "ship", "frustration": "meetings"},
        {"name": "Ben", "role": "Eng", "motivation": "quality", "frustration": "churn"}
    ]}"#;

    #[tokio::test]
    async fn runs_a_tool_end_to_end() {
        let provider = Arc::new(SequentialMockProvider::single_text(
            r#"{"signal_summary": "Churn up", "why_it_matters": "Revenue", "possible_next_step": "Call"}"#,
        ));
        let (runner, _) = runner(provider.clone());

        let outcome = runner
            .run("signal_lab", "alice", fields(json!({"signal": "churn"})))
            .await
            .unwrap();

        assert_eq!(outcome.result.parse_status, ParseStatus::Success);
        assert_eq!(outcome.result.fields["signal_summary"], "Churn up");
        assert_eq!(outcome.usage.map(|u| u.total_tokens), Some(15));

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "gpt-4o");
        assert_eq!(requests[0].messages[0].content, "Read the signal: churn");
        assert_eq!(requests[0].messages.last().unwrap().role, Role::User);
        assert!(requests[0].messages[1].content.contains("\"signal_summary\""));
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected_before_any_call() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let (runner, _) = runner(provider.clone());
        let err = runner.run("nope", "alice", Map::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnknownTool(t) if t == "nope"));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_template_is_a_configuration_error() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let (runner, _) = runner(provider);
        let err = runner.run("ritual_guide", "alice", Map::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[tokio::test]
    async fn blank_template_model_uses_default() {
        let provider = Arc::new(SequentialMockProvider::single_text(LINEUP));
        let (runner, _) = runner(provider.clone());
        runner
            .run("persona_lineup", "alice", Map::new())
            .await
            .unwrap();
        assert_eq!(provider.requests()[0].model, "fallback-model");
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_model_times_out() {
        let (runner, _) = runner(Arc::new(StalledProvider));
        let runner = runner.with_timeout(Duration::from_secs(5));
        let err = runner
            .run("signal_lab", "alice", Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamTimeout(5)));
    }

    #[tokio::test]
    async fn provider_errors_are_classified() {
        let (timeout_runner, _) = runner(Arc::new(SequentialMockProvider::failing(
            ProviderError::Timeout("read".into()),
        )));
        let err = timeout_runner
            .run("signal_lab", "alice", Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamTimeout(_)));

        let (api_runner, _) = runner(Arc::new(SequentialMockProvider::failing(
            ProviderError::ApiError {
                status_code: 500,
                message: "boom".into(),
            },
        )));
        let err = api_runner
            .run("signal_lab", "alice", Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamService(_)));
    }

    #[tokio::test]
    async fn malformed_reply_is_not_an_error() {
        let provider = Arc::new(SequentialMockProvider::single_text("Sorry, I can't help."));
        let (runner, _) = runner(provider);
        let outcome = runner
            .run("signal_lab", "alice", Map::new())
            .await
            .unwrap();
        assert_eq!(outcome.result.parse_status, ParseStatus::Failed);
        assert_eq!(outcome.to_flat_json()["raw_response"], "Sorry, I can't help.");
    }

    #[tokio::test]
    async fn lineup_personas_flow_into_focus_group() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            Ok(make_text_response(LINEUP)),
            Ok(make_text_response(r#"{"reactions": [], "consensus": "mixed", "open_questions": []}"#)),
        ]));
        let (runner, sessions) = runner(provider.clone());

        runner
            .run("persona_lineup", "alice", Map::new())
            .await
            .unwrap();
        let stored = sessions
            .get(&SessionKey::new("alice", "personas"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.as_array().map(Vec::len), Some(2));

        runner
            .run("focus_group", "alice", fields(json!({"idea": "dark mode"})))
            .await
            .unwrap();
        let second = &provider.requests()[1];
        assert_eq!(
            second.messages[0].content,
            "Test dark mode with \
             Ava (frustration: meetings, motivation: ship, role: PM), \
             Ben (frustration: churn, motivation: quality, role: Eng)"
        );
    }

    #[tokio::test]
    async fn sessions_are_per_user() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            Ok(make_text_response(LINEUP)),
            Ok(make_text_response("{}")),
        ]));
        let (runner, _) = runner(provider.clone());

        runner
            .run("persona_lineup", "alice", Map::new())
            .await
            .unwrap();
        runner
            .run("focus_group", "bob", fields(json!({"idea": "x"})))
            .await
            .unwrap();
        assert_eq!(provider.requests()[1].messages[0].content, "Test x with ");
    }

    #[tokio::test]
    async fn failed_parse_does_not_overwrite_session() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            Ok(make_text_response(LINEUP)),
            Ok(make_text_response("no personas today")),
        ]));
        let (runner, sessions) = runner(provider);

        runner.run("persona_lineup", "alice", Map::new()).await.unwrap();
        runner.run("persona_lineup", "alice", Map::new()).await.unwrap();

        let stored = sessions
            .get(&SessionKey::new("alice", "personas"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored[0]["name"], "Ava");
    }

    #[test]
    fn normalize_only_uses_tool_schema() {
        let (runner, _) = runner(Arc::new(SequentialMockProvider::new(vec![])));
        let result = runner
            .normalize_only("experiment_designer", r#"{"target_sample": "5000"}"#)
            .unwrap();
        assert_eq!(result.fields["target_sample"], 5000);
        assert!(matches!(
            runner.normalize_only("nope", "x"),
            Err(PipelineError::UnknownTool(_))
        ));
    }
}
