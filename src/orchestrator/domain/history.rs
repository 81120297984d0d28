//! Interaction history kept across reasoning cycles.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One capability call requested by the reasoner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedCall {
    /// Correlates the call with its observation.
    pub call_id: String,
    /// Qualified or bare capability name.
    pub name: String,
    /// JSON arguments for the call.
    pub arguments: Value,
}

impl RequestedCall {
    /// Creates a requested call.
    #[must_use]
    pub fn new(call_id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// One entry in the interaction history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum InteractionRecord {
    /// Request text from the user.
    User {
        /// Request text.
        content: String,
    },
    /// Reasoner output, possibly requesting capability calls.
    Assistant {
        /// Reasoner text.
        content: String,
        /// Calls requested in this turn.
        calls: Vec<RequestedCall>,
    },
    /// Result of one capability call.
    Observation {
        /// Call the observation answers.
        call_id: String,
        /// Capability name as requested.
        capability: String,
        /// Output text, or the failure description.
        content: String,
        /// Whether the call failed.
        is_error: bool,
    },
}

impl InteractionRecord {
    /// Creates a user record.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// Creates an assistant record.
    #[must_use]
    pub fn assistant(content: impl Into<String>, calls: Vec<RequestedCall>) -> Self {
        Self::Assistant {
            content: content.into(),
            calls,
        }
    }

    /// Returns the calls requested by an assistant record.
    #[must_use]
    pub fn requested_calls(&self) -> &[RequestedCall] {
        match self {
            Self::Assistant { calls, .. } => calls,
            Self::User { .. } | Self::Observation { .. } => &[],
        }
    }
}

/// Ordered interaction history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InteractionHistory {
    records: Vec<InteractionRecord>,
}

impl InteractionHistory {
    /// Creates an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Appends a record.
    pub fn push(&mut self, record: InteractionRecord) {
        self.records.push(record);
    }

    /// Returns every record, oldest first.
    #[must_use]
    pub fn records(&self) -> &[InteractionRecord] {
        &self.records
    }

    /// Returns at most the last `window` records.
    #[must_use]
    pub fn recent(&self, window: usize) -> &[InteractionRecord] {
        let start = self.records.len().saturating_sub(window);
        self.records.get(start..).unwrap_or_default()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
