//! Loading prompt templates from a TOML seed file.
//!
//! ```toml
//! [[templates]]
//! tool_name = "signal_lab"
//! model = "gpt-4o-mini"
//! temperature = 0.4
//! prompt_text = """
//! You help a team read a market signal: {{signal}}
//! """
//! ```

use ritualcraft_core::error::StoreError;
use ritualcraft_core::template::{PromptTemplate, TemplateStore};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default)]
    templates: Vec<PromptTemplate>,
}

/// Parse seed TOML into templates.
pub fn parse_seed(content: &str) -> Result<Vec<PromptTemplate>, StoreError> {
    let file: SeedFile = toml::from_str(content)
        .map_err(|e| StoreError::InvalidRecord(format!("seed file: {e}")))?;

    for (i, tpl) in file.templates.iter().enumerate() {
        if tpl.tool_name.trim().is_empty() {
            return Err(StoreError::InvalidRecord(format!(
                "seed template #{i} has no tool_name"
            )));
        }
    }
    Ok(file.templates)
}

/// Read and parse a seed file from disk.
pub fn load_seed_file(path: &Path) -> Result<Vec<PromptTemplate>, StoreError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| StoreError::Storage(format!("Failed to read {}: {e}", path.display())))?;
    parse_seed(&content)
}

/// Upsert every template into `store`. Returns how many were written.
pub async fn seed_store(
    store: &dyn TemplateStore,
    templates: Vec<PromptTemplate>,
) -> Result<usize, StoreError> {
    let count = templates.len();
    for template in templates {
        store.upsert(template).await?;
    }
    info!(count, backend = store.name(), "Seeded prompt templates");
    Ok(count)
}
