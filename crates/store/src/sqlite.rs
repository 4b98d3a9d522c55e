//! SQLite template store.
//!
//! One table, `prompt_templates`, keyed by tool name. Sampling parameters
//! are stored as columns so operators can edit them with plain SQL.

use async_trait::async_trait;
use chrono::Utc;
use ritualcraft_core::error::StoreError;
use ritualcraft_core::provider::ModelParams;
use ritualcraft_core::template::{PromptTemplate, TemplateStore};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// Prompt templates persisted in SQLite.
pub struct SqliteTemplateStore {
    pool: SqlitePool,
}

impl SqliteTemplateStore {
    /// Open (or create) the database at `path`.
    ///
    /// Pass `":memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite template store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS prompt_templates (
                tool_name          TEXT PRIMARY KEY NOT NULL,
                prompt_text        TEXT NOT NULL,
                model              TEXT NOT NULL,
                max_tokens         INTEGER NOT NULL,
                temperature        REAL NOT NULL,
                top_p              REAL NOT NULL,
                frequency_penalty  REAL NOT NULL DEFAULT 0.0,
                presence_penalty   REAL NOT NULL DEFAULT 0.0,
                updated_at         TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("prompt_templates table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_template(row: &sqlx::sqlite::SqliteRow) -> Result<PromptTemplate, StoreError> {
        let column = |name: &str, e: sqlx::Error| StoreError::QueryFailed(format!("{name} column: {e}"));

        let tool_name: String = row.try_get("tool_name").map_err(|e| column("tool_name", e))?;
        let prompt_text: String = row
            .try_get("prompt_text")
            .map_err(|e| column("prompt_text", e))?;
        let model: String = row.try_get("model").map_err(|e| column("model", e))?;
        let max_tokens: i64 = row.try_get("max_tokens").map_err(|e| column("max_tokens", e))?;
        let temperature: f64 = row
            .try_get("temperature")
            .map_err(|e| column("temperature", e))?;
        let top_p: f64 = row.try_get("top_p").map_err(|e| column("top_p", e))?;
        let frequency_penalty: f64 = row
            .try_get("frequency_penalty")
            .map_err(|e| column("frequency_penalty", e))?;
        let presence_penalty: f64 = row
            .try_get("presence_penalty")
            .map_err(|e| column("presence_penalty", e))?;
        let updated_at_str: String = row
            .try_get("updated_at")
            .map_err(|e| column("updated_at", e))?;

        let max_tokens = u32::try_from(max_tokens).map_err(|_| {
            StoreError::InvalidRecord(format!("{tool_name}: max_tokens out of range ({max_tokens})"))
        })?;

        let updated_at = chrono::DateTime::parse_from_rfc3339(&updated_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(PromptTemplate {
            tool_name,
            prompt_text,
            model,
            params: ModelParams {
                max_tokens,
                temperature: temperature as f32,
                top_p: top_p as f32,
                frequency_penalty: frequency_penalty as f32,
                presence_penalty: presence_penalty as f32,
            },
            updated_at,
        })
    }
}

#[async_trait]
impl TemplateStore for SqliteTemplateStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, tool_name: &str) -> Result<Option<PromptTemplate>, StoreError> {
        let row = sqlx::query("SELECT * FROM prompt_templates WHERE tool_name = ?")
            .bind(tool_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("get: {e}")))?;

        row.as_ref().map(Self::row_to_template).transpose()
    }

    async fn upsert(&self, template: PromptTemplate) -> Result<(), StoreError> {
        if template.tool_name.trim().is_empty() {
            return Err(StoreError::InvalidRecord("tool_name is empty".into()));
        }

        sqlx::query(
            r#"
            INSERT INTO prompt_templates
                (tool_name, prompt_text, model, max_tokens, temperature, top_p,
                 frequency_penalty, presence_penalty, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(tool_name) DO UPDATE SET
                prompt_text       = excluded.prompt_text,
                model             = excluded.model,
                max_tokens        = excluded.max_tokens,
                temperature       = excluded.temperature,
                top_p             = excluded.top_p,
                frequency_penalty = excluded.frequency_penalty,
                presence_penalty  = excluded.presence_penalty,
                updated_at        = excluded.updated_at
            "#,
        )
        .bind(&template.tool_name)
        .bind(&template.prompt_text)
        .bind(&template.model)
        .bind(i64::from(template.params.max_tokens))
        .bind(f64::from(template.params.temperature))
        .bind(f64::from(template.params.top_p))
        .bind(f64::from(template.params.frequency_penalty))
        .bind(f64::from(template.params.presence_penalty))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("upsert: {e}")))?;

        debug!(tool = %template.tool_name, "Template upserted");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<PromptTemplate>, StoreError> {
        let rows = sqlx::query("SELECT * FROM prompt_templates ORDER BY tool_name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("list: {e}")))?;

        rows.iter().map(Self::row_to_template).collect()
    }
}
