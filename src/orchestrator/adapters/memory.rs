//! Scripted reasoner for tests and offline runs.

use crate::orchestrator::{
    domain::{Decision, ReasonerError, ReasoningRequest},
    ports::Reasoner,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
struct Script {
    decisions: VecDeque<Result<Decision, ReasonerError>>,
    requests: Vec<ReasoningRequest>,
}

/// Reasoner that replays a fixed sequence of decisions.
///
/// Every request it receives is recorded, so tests can inspect what each
/// cycle was shown. Once the script runs out it fails every further cycle.
#[derive(Debug, Clone, Default)]
pub struct ScriptedReasoner {
    script: Arc<Mutex<Script>>,
}

impl ScriptedReasoner {
    /// Creates a reasoner replaying `decisions` in order.
    #[must_use]
    pub fn new(decisions: impl IntoIterator<Item = Decision>) -> Self {
        let reasoner = Self::default();
        for decision in decisions {
            reasoner.push(decision);
        }
        reasoner
    }

    /// Appends a decision to the script.
    pub fn push(&self, decision: Decision) {
        self.lock().decisions.push_back(Ok(decision));
    }

    /// Appends a failure to the script.
    pub fn push_failure(&self, message: &str) {
        self.lock()
            .decisions
            .push_back(Err(ReasonerError::new(message)));
    }

    /// Returns every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ReasoningRequest> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn decide(&self, request: ReasoningRequest) -> Result<Decision, ReasonerError> {
        let mut script = self.lock();
        script.requests.push(request);
        script
            .decisions
            .pop_front()
            .unwrap_or_else(|| Err(ReasonerError::new("script exhausted")))
    }
}
