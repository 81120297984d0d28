//! Standing instruction text with scoped, self-restoring overrides.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Holds the instruction text presented to the reasoner.
///
/// The standing text never changes. [`InstructionSlot::apply`] swaps in an
/// override that lasts until the returned guard drops, on every exit path.
#[derive(Debug)]
pub struct InstructionSlot {
    standing: String,
    current: Mutex<String>,
}

impl InstructionSlot {
    /// Creates a slot showing `standing`.
    #[must_use]
    pub fn new(standing: impl Into<String>) -> Self {
        let text = standing.into();
        Self {
            current: Mutex::new(text.clone()),
            standing: text,
        }
    }

    /// Returns the standing instruction.
    #[must_use]
    pub fn standing(&self) -> &str {
        &self.standing
    }

    /// Returns the instruction currently in effect.
    #[must_use]
    pub fn current(&self) -> String {
        self.lock().clone()
    }

    /// Returns whether an override is in effect.
    #[must_use]
    pub fn is_overridden(&self) -> bool {
        *self.lock() != self.standing
    }

    /// Replaces the instruction until the returned guard drops.
    #[must_use = "the override is reverted as soon as the guard drops"]
    pub fn apply(&self, text: impl Into<String>) -> InstructionOverride<'_> {
        let previous = std::mem::replace(&mut *self.lock(), text.into());
        InstructionOverride {
            slot: self,
            previous: Some(previous),
        }
    }

    fn lock(&self) -> MutexGuard<'_, String> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Restores the previous instruction when dropped.
#[derive(Debug)]
pub struct InstructionOverride<'a> {
    slot: &'a InstructionSlot,
    previous: Option<String>,
}

impl Drop for InstructionOverride<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *self.slot.lock() = previous;
        }
    }
}
