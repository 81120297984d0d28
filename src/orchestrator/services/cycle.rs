//! The reasoning/act cycle.

use super::{ProviderBootstrap, ShutdownHook};
use crate::capability::{
    domain::CapabilityDescriptor,
    ports::TransportConnector,
    services::{CapabilitySnapshot, ProviderConnectionManager, TeardownReport},
};
use crate::orchestrator::{
    domain::{
        BootstrapReport, Decision, InstructionSlot, InteractionHistory, InteractionRecord,
        OrchestratorError, ProviderEntry, ReasoningRequest, RequestedCall, RunOutcome,
        StepOutcome, StepReport,
    },
    ports::{ContextOverride, Reasoner},
};
use mockable::Clock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

/// Limits applied to orchestrator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Maximum number of cycles per run.
    pub max_steps: u32,
    /// Maximum number of characters kept from one observation.
    pub max_observe: usize,
    /// Number of most recent history records checked by overrides.
    pub recent_window: usize,
    /// Deadline for each capability call; `None` defers to the transport.
    pub call_timeout: Option<Duration>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_steps: 20,
            max_observe: 10_000,
            recent_window: 3,
            call_timeout: None,
        }
    }
}

/// Drives reasoning cycles over the live capability registry.
///
/// Runs are serialised through the history lock. Connects and disconnects
/// issued through the manager may happen at any time, including while a
/// cycle is waiting on the reasoner; each cycle works from the one snapshot
/// it took.
pub struct Orchestrator<C, K, R>
where
    C: TransportConnector,
    K: Clock + Send + Sync,
    R: Reasoner,
{
    manager: Arc<ProviderConnectionManager<C, K>>,
    reasoner: Arc<R>,
    bootstrap: ProviderBootstrap<C, K>,
    shutdown: ShutdownHook<C, K>,
    instruction: InstructionSlot,
    overrides: Vec<Arc<dyn ContextOverride>>,
    history: Mutex<InteractionHistory>,
    settings: OrchestratorSettings,
}

impl<C, K, R> Orchestrator<C, K, R>
where
    C: TransportConnector,
    K: Clock + Send + Sync,
    R: Reasoner,
{
    /// Creates an orchestrator with no configured providers or overrides.
    #[must_use]
    pub fn new(
        manager: Arc<ProviderConnectionManager<C, K>>,
        reasoner: Arc<R>,
        standing_instruction: impl Into<String>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            bootstrap: ProviderBootstrap::new(Arc::clone(&manager), Vec::new()),
            shutdown: ShutdownHook::new(Arc::clone(&manager)),
            manager,
            reasoner,
            instruction: InstructionSlot::new(standing_instruction),
            overrides: Vec::new(),
            history: Mutex::new(InteractionHistory::new()),
            settings,
        }
    }

    /// Sets the providers connected by the one-time bootstrap.
    #[must_use]
    pub fn with_providers(mut self, entries: Vec<ProviderEntry>) -> Self {
        self.bootstrap = ProviderBootstrap::new(Arc::clone(&self.manager), entries);
        self
    }

    /// Adds a context override; the first one that fires wins.
    #[must_use]
    pub fn with_override(mut self, rule: Arc<dyn ContextOverride>) -> Self {
        self.overrides.push(rule);
        self
    }

    /// Returns the connection manager.
    #[must_use]
    pub const fn manager(&self) -> &Arc<ProviderConnectionManager<C, K>> {
        &self.manager
    }

    /// Returns the instruction slot.
    #[must_use]
    pub const fn instruction(&self) -> &InstructionSlot {
        &self.instruction
    }

    /// Returns the run limits.
    #[must_use]
    pub const fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Runs the provider bootstrap unless it already ran.
    pub async fn ensure_bootstrapped(&self) -> &BootstrapReport {
        self.bootstrap.ensure().await
    }

    /// Returns whether the provider bootstrap has completed.
    #[must_use]
    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrap.is_complete()
    }

    /// Returns a copy of the interaction history.
    pub async fn history(&self) -> InteractionHistory {
        self.history.lock().await.clone()
    }

    /// Handles one user request until the reasoner finishes.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Reasoner`] when the reasoner fails,
    /// [`OrchestratorError::StepLimitReached`] when `max_steps` cycles pass
    /// without an answer and [`OrchestratorError::ShutDown`] after shutdown.
    /// Failed capability calls are not errors; they become observations.
    pub async fn run(&self, request: &str) -> Result<RunOutcome, OrchestratorError> {
        if self.shutdown.has_fired() {
            return Err(OrchestratorError::ShutDown);
        }
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("orchestrator_run", %run_id);
        self.run_cycles(run_id, request).instrument(span).await
    }

    async fn run_cycles(&self, run_id: Uuid, request: &str) -> Result<RunOutcome, OrchestratorError> {
        let mut history = self.history.lock().await;
        history.push(InteractionRecord::user(request));

        let mut steps = Vec::new();
        for step in 1..=self.settings.max_steps {
            let report = self.cycle(&mut history, run_id, step).await?;
            let answer = match &report.outcome {
                StepOutcome::Finished(answer) => Some(answer.clone()),
                StepOutcome::Acted { .. } => None,
            };
            steps.push(report);
            if let Some(final_answer) = answer {
                tracing::info!(steps = steps.len(), "run finished");
                return Ok(RunOutcome {
                    run_id,
                    answer: final_answer,
                    steps,
                });
            }
        }

        tracing::warn!(max_steps = self.settings.max_steps, "run hit the step limit");
        Err(OrchestratorError::StepLimitReached {
            max_steps: self.settings.max_steps,
        })
    }

    async fn cycle(
        &self,
        history: &mut InteractionHistory,
        run_id: Uuid,
        step: u32,
    ) -> Result<StepReport, OrchestratorError> {
        self.bootstrap.ensure().await;

        let situational = self.situational_instruction(history.recent(self.settings.recent_window));
        let guard = situational.map(|text| self.instruction.apply(text));
        let instruction_overridden = guard.is_some();

        let snapshot = self.manager.registry().snapshot();
        let request = ReasoningRequest {
            run_id,
            step,
            instruction: self.instruction.current(),
            capabilities: snapshot.listing(),
            generation: snapshot.generation(),
            history: history.records().to_vec(),
        };
        tracing::debug!(
            step,
            generation = snapshot.generation(),
            capabilities = snapshot.len(),
            instruction_overridden,
            "reasoning"
        );
        let decided = self.reasoner.decide(request).await;
        drop(guard);

        let outcome = match decided? {
            Decision::Finish { answer } => {
                history.push(InteractionRecord::assistant(answer.clone(), Vec::new()));
                StepOutcome::Finished(answer)
            }
            Decision::Invoke { thought, calls } => {
                history.push(InteractionRecord::assistant(thought, calls.clone()));
                let mut failed = 0;
                for call in &calls {
                    let observation = self.dispatch(&snapshot, call).await;
                    if matches!(observation, InteractionRecord::Observation { is_error: true, .. }) {
                        failed += 1;
                    }
                    history.push(observation);
                }
                StepOutcome::Acted {
                    dispatched: calls.len(),
                    failed,
                }
            }
        };

        Ok(StepReport {
            step,
            generation: snapshot.generation(),
            instruction_overridden,
            outcome,
        })
    }

    fn situational_instruction(&self, recent: &[InteractionRecord]) -> Option<String> {
        for rule in &self.overrides {
            match rule.instruction(self.instruction.standing(), recent) {
                Ok(Some(text)) => return Some(text),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "instruction override failed; keeping the standing instruction");
                }
            }
        }
        None
    }

    async fn dispatch(&self, snapshot: &CapabilitySnapshot, call: &RequestedCall) -> InteractionRecord {
        let started = Instant::now();
        let result = match snapshot.resolve(&call.name) {
            Ok(descriptor) => self.invoke(&descriptor, call).await,
            Err(err) => Err(format!("not_found: {err}")),
        };

        let (content, is_error) = match result {
            Ok(text) => {
                tracing::debug!(
                    capability = %call.name,
                    elapsed_ms = started.elapsed().as_millis(),
                    "capability call succeeded"
                );
                (truncate_chars(text, self.settings.max_observe), false)
            }
            Err(description) => {
                tracing::warn!(
                    capability = %call.name,
                    elapsed_ms = started.elapsed().as_millis(),
                    error = %description,
                    "capability call failed"
                );
                (description, true)
            }
        };

        InteractionRecord::Observation {
            call_id: call.call_id.clone(),
            capability: call.name.clone(),
            content,
            is_error,
        }
    }

    async fn invoke(
        &self,
        descriptor: &CapabilityDescriptor,
        call: &RequestedCall,
    ) -> Result<String, String> {
        let invocation = match self.settings.call_timeout {
            Some(timeout) => {
                descriptor
                    .invoke_with_timeout(call.arguments.clone(), timeout)
                    .await
            }
            None => descriptor.invoke(call.arguments.clone()).await,
        };
        invocation
            .map(|output| output.text().to_owned())
            .map_err(|err| format!("{}: {}", err.reason().as_str(), err.detail()))
    }

    /// Runs the shutdown hook; only the first call tears anything down.
    pub async fn shutdown(&self) -> Option<TeardownReport> {
        self.shutdown.fire().await
    }

    /// Returns whether the shutdown hook has run.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.has_fired()
    }
}

fn truncate_chars(mut text: String, max_chars: usize) -> String {
    if let Some((cut, _)) = text.char_indices().nth(max_chars) {
        text.truncate(cut);
    }
    text
}
