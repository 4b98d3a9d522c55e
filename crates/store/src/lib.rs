//! Template and session storage for Ritualcraft.
//!
//! - [`InMemoryTemplateStore`]: templates held in process, optionally seeded
//!   from a TOML file.
//! - [`SqliteTemplateStore`]: templates persisted in a SQLite file.
//! - [`InMemorySessionStore`]: per-user session slots with a time-to-live.

pub mod in_memory;
pub mod seed;
pub mod session;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryTemplateStore;
pub use seed::{load_seed_file, parse_seed, seed_store};
pub use session::InMemorySessionStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteTemplateStore;
