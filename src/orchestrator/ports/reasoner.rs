//! Reasoner port: the external decision maker behind each cycle.

use crate::orchestrator::domain::{Decision, ReasonerError, ReasoningRequest};
use async_trait::async_trait;

/// Decides what to do next given the instruction, capabilities and history.
///
/// Prompt construction and response parsing live behind this port.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Produces the decision for one cycle.
    ///
    /// # Errors
    ///
    /// Returns [`ReasonerError`] when no decision could be produced.
    async fn decide(&self, request: ReasoningRequest) -> Result<Decision, ReasonerError>;
}
