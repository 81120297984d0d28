//! Domain model for the reasoning loop.
//!
//! Interaction history, reasoning decisions, the scoped instruction slot,
//! bootstrap plans and the loop's error taxonomy.

mod bootstrap;
mod decision;
mod error;
mod history;
mod instruction;

pub use bootstrap::{BootstrapFailure, BootstrapReport, ProviderEntry};
pub use decision::{Decision, ReasoningRequest, RunOutcome, StepOutcome, StepReport};
pub use error::{OrchestratorError, OverrideError, ReasonerError};
pub use history::{InteractionHistory, InteractionRecord, RequestedCall};
pub use instruction::{InstructionOverride, InstructionSlot};
