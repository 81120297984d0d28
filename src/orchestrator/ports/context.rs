//! Situational instruction overrides.

use crate::orchestrator::domain::{InteractionRecord, OverrideError};

/// Computes a one-cycle replacement for the standing instruction.
pub trait ContextOverride: Send + Sync {
    /// Returns replacement text when `recent` calls for one.
    ///
    /// # Errors
    ///
    /// Returns [`OverrideError`] when the replacement cannot be produced; the
    /// cycle then runs with the standing instruction.
    fn instruction(
        &self,
        standing: &str,
        recent: &[InteractionRecord],
    ) -> Result<Option<String>, OverrideError>;
}
