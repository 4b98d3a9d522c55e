//! # Ritualcraft Core
//!
//! Domain types, traits, and error definitions for the Ritualcraft planning
//! service. This crate has **zero framework dependencies**: it defines the
//! domain model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every collaborator is defined as a trait here (the model provider, the
//! template store, the session store). Implementations live in their
//! respective crates, which keeps the pipeline testable with in-process
//! stubs and keeps the dependency graph pointing inward at core.

pub mod error;
pub mod message;
pub mod provider;
pub mod session;
pub mod template;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, StoreError};
pub use message::{Message, Role};
pub use provider::{ModelParams, Provider, ProviderRequest, ProviderResponse, Usage};
pub use session::{SessionKey, SessionStore};
pub use template::{PromptTemplate, TemplateStore};
