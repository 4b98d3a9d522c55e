//! Prompt templates and the store they are read from.
//!
//! A template is created by operator tooling, changed only through the admin
//! update path, and read on every tool invocation. Updates are
//! last-writer-wins with no versioning.

use crate::error::StoreError;
use crate::provider::ModelParams;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored prompt template for one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Unique key: the tool this template drives
    pub tool_name: String,

    /// Template body containing `{{placeholder}}` tokens
    pub prompt_text: String,

    /// Model to call
    pub model: String,

    /// Sampling parameters
    #[serde(flatten)]
    pub params: ModelParams,

    /// Last time an operator changed this template
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl PromptTemplate {
    /// Create a template with default sampling parameters.
    pub fn new(
        tool_name: impl Into<String>,
        prompt_text: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            prompt_text: prompt_text.into(),
            model: model.into(),
            params: ModelParams::default(),
            updated_at: Utc::now(),
        }
    }

    /// Replace the sampling parameters.
    pub fn with_params(mut self, params: ModelParams) -> Self {
        self.params = params;
        self
    }
}

/// The template store collaborator.
///
/// Implementations: in-memory (seeded from TOML), SQLite.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// The backend name (e.g., "memory", "sqlite").
    fn name(&self) -> &str;

    /// Fetch the template for a tool. `None` means the tool is not configured.
    async fn get(&self, tool_name: &str) -> Result<Option<PromptTemplate>, StoreError>;

    /// Insert or replace a template (last writer wins).
    async fn upsert(&self, template: PromptTemplate) -> Result<(), StoreError>;

    /// List all templates ordered by tool name.
    async fn list(&self) -> Result<Vec<PromptTemplate>, StoreError>;
}
