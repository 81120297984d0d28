//! Reasoner inputs and outputs, and the results of cycles and runs.

use super::{InteractionRecord, RequestedCall};
use crate::capability::domain::CapabilityListing;
use serde::Serialize;
use uuid::Uuid;

/// Everything the reasoner sees for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReasoningRequest {
    /// Run the cycle belongs to.
    pub run_id: Uuid,
    /// One-based cycle number within the run.
    pub step: u32,
    /// Instruction in effect for this cycle.
    pub instruction: String,
    /// Callable capabilities, taken from one registry snapshot.
    pub capabilities: Vec<CapabilityListing>,
    /// Registry generation of that snapshot.
    pub generation: u64,
    /// Interaction history so far.
    pub history: Vec<InteractionRecord>,
}

/// What the reasoner decided to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Stop and answer.
    Finish {
        /// Final answer.
        answer: String,
    },
    /// Invoke capabilities, then reason again.
    Invoke {
        /// Reasoner text accompanying the calls.
        thought: String,
        /// Calls to dispatch in order.
        calls: Vec<RequestedCall>,
    },
}

/// Result of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The reasoner finished with an answer.
    Finished(String),
    /// Calls were dispatched; `failed` of them did not succeed.
    Acted {
        /// Number of calls dispatched.
        dispatched: usize,
        /// Number of calls that failed.
        failed: usize,
    },
}

/// Report of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    /// One-based cycle number within the run.
    pub step: u32,
    /// Registry generation the cycle reasoned over.
    pub generation: u64,
    /// Whether a situational instruction replaced the standing one.
    pub instruction_overridden: bool,
    /// What happened.
    pub outcome: StepOutcome,
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Run identifier, also recorded on the run's tracing span.
    pub run_id: Uuid,
    /// Final answer.
    pub answer: String,
    /// Per-cycle reports in order.
    pub steps: Vec<StepReport>,
}
