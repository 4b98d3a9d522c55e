//! In-memory template store: the default backend, also used in tests.

use async_trait::async_trait;
use chrono::Utc;
use ritualcraft_core::error::StoreError;
use ritualcraft_core::template::{PromptTemplate, TemplateStore};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Templates keyed by tool name. Contents are lost on restart.
pub struct InMemoryTemplateStore {
    templates: Arc<RwLock<BTreeMap<String, PromptTemplate>>>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self {
            templates: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Build a store pre-filled with `templates`. Later entries replace
    /// earlier ones with the same tool name.
    pub fn with_templates(templates: impl IntoIterator<Item = PromptTemplate>) -> Self {
        let map = templates
            .into_iter()
            .map(|t| (t.tool_name.clone(), t))
            .collect();
        Self {
            templates: Arc::new(RwLock::new(map)),
        }
    }

    pub async fn len(&self) -> usize {
        self.templates.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.templates.read().await.is_empty()
    }
}

impl Default for InMemoryTemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TemplateStore for InMemoryTemplateStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, tool_name: &str) -> Result<Option<PromptTemplate>, StoreError> {
        Ok(self.templates.read().await.get(tool_name).cloned())
    }

    async fn upsert(&self, mut template: PromptTemplate) -> Result<(), StoreError> {
        if template.tool_name.trim().is_empty() {
            return Err(StoreError::InvalidRecord("tool_name is empty".into()));
        }
        template.updated_at = Utc::now();
        self.templates
            .write()
            .await
            .insert(template.tool_name.clone(), template);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<PromptTemplate>, StoreError> {
        Ok(self.templates.read().await.values().cloned().collect())
    }
}
