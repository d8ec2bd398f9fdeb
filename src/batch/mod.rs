//! Batch signing orchestration
//!
//! Validates, chunks, parallelizes, commits, and aggregates outcomes for a
//! set of signing operations. One bad item can never poison its batch:
//! every failure short of the two top-level admission checks is recorded
//! per item and processing continues.

mod orchestrator;
mod outcome;

pub use orchestrator::{BatchOrchestrator, OrchestratorConfig};
pub use outcome::{BatchOutcome, FailedItem, SignedItem};
