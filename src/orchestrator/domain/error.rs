//! Error types for the reasoning loop.

use thiserror::Error;

/// Failure reported by the external reasoner.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("reasoner failed: {message}")]
pub struct ReasonerError {
    message: String,
}

impl ReasonerError {
    /// Creates a reasoner error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Failure while computing a situational instruction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OverrideError {
    /// The override template failed to render.
    #[error("override template for {capability} failed to render: {reason}")]
    Template {
        /// Capability the override watches for.
        capability: String,
        /// Renderer error text.
        reason: String,
    },
}

/// Errors returned by orchestrator runs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    /// The reasoner failed; the instruction has already been restored.
    #[error(transparent)]
    Reasoner(#[from] ReasonerError),

    /// The run used every allowed cycle without finishing.
    #[error("run did not finish within {max_steps} steps")]
    StepLimitReached {
        /// Configured cycle limit.
        max_steps: u32,
    },

    /// The shutdown hook has already run.
    #[error("orchestrator has been shut down")]
    ShutDown,
}
