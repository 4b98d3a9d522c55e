//! Session store trait: short-lived per-user state held between requests.
//!
//! Some tools produce state a later tool consumes (a generated persona
//! lineup feeds the focus group). That state lives server-side, keyed by
//! user and slot, and expires after a configured time-to-live.

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identifies one piece of session state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub user_id: String,
    pub slot: String,
}

impl SessionKey {
    pub fn new(user_id: impl Into<String>, slot: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            slot: slot.into(),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.user_id, self.slot)
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a live value. Expired entries read as `None`.
    async fn get(&self, key: &SessionKey) -> Result<Option<serde_json::Value>, StoreError>;

    /// Store a value that expires after `ttl`.
    async fn put(
        &self,
        key: SessionKey,
        value: serde_json::Value,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Remove a value. Returns whether anything was removed.
    async fn remove(&self, key: &SessionKey) -> Result<bool, StoreError>;
}
