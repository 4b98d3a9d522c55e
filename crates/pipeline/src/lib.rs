//! Ritualcraft tool pipeline.
//!
//! Wires the pieces every tool handler shares: the [`assembler`] builds the
//! model prompt from a stored template, the [`catalog`] says which schema a
//! tool's reply must satisfy, and the [`runner`] drives one request from
//! template fetch through normalization.

pub mod assembler;
pub mod catalog;
pub mod runner;

#[cfg(test)]
mod test_helpers;

pub use assembler::{AssembledPrompt, AssemblyTrace, assemble};
pub use catalog::{Catalog, ToolSpec};
pub use runner::{PipelineError, ToolOutcome, ToolRunner};
