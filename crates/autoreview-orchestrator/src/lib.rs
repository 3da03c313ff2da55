//! Orchestration of AI reviews for pull/merge requests.
//!
//! [`ReviewOrchestrator`] owns the lifecycle of every review: it reserves the
//! item in the [`ReviewRegistry`], optionally waits for running CI through
//! the [`CiGate`], validates the toolchain, drives the analysis process via
//! `subprocess-runner`, persists the result and broadcasts [`ReviewEvent`]s.

pub mod ci_gate;
pub mod error;
pub mod events;
pub mod merge;
pub mod orchestrator;
pub mod registry;
pub mod report;

#[cfg(test)]
mod test_support;

pub use ci_gate::{CiGate, CiWaitOutcome};
pub use error::{OrchestratorError, Result};
pub use events::{EventBus, ReviewEvent, ReviewStage};
pub use merge::{check_merge_readiness, CiStatus, MergeReadiness};
pub use orchestrator::{
    Preflight, ReviewOrchestrator, ReviewOutcome, ReviewRequest, ReviewTask, ToolchainPreflight,
};
pub use registry::{ReviewRegistry, SlotState};
