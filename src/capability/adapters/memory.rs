//! In-memory transport adapter for connection-manager tests.

use crate::capability::{
    domain::{
        CapabilityDefinition, CapabilityDescriptor, CapabilityOutput, ConnectionError,
        ConnectionFailure, InvocationError, ProviderId, ProviderTarget, TransportKind,
    },
    ports::{
        CapabilityInvoker, OpenedBinding, TransportBinding, TransportCloseError,
        TransportCloseResult, TransportConnector,
    },
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Notify;

/// How the in-memory connector answers a given target.
#[derive(Debug, Clone)]
pub enum InMemoryTargetBehaviour {
    /// Complete the handshake and advertise these capabilities.
    Serve(Vec<CapabilityDefinition>),
    /// Fail the connection attempt with this reason.
    Fail(ConnectionFailure),
    /// Never answer the handshake.
    Hang,
}

/// In-memory transport connector.
///
/// Targets are matched on [`ProviderTarget::describe`]. No process or socket
/// is ever opened, so it is suitable for deterministic lifecycle tests.
/// Bindings that are dropped without being closed stay counted as live,
/// which lets tests detect leaked connections.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConnector {
    state: Arc<RwLock<InMemoryState>>,
    counters: Arc<Counters>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    behaviours: HashMap<String, InMemoryTargetBehaviour>,
    open_delay: Duration,
    close_delay: Duration,
    close_fails: bool,
}

#[derive(Debug, Default)]
struct Counters {
    opened: AtomicUsize,
    live: AtomicUsize,
    invocations: AtomicUsize,
}

impl InMemoryConnector {
    /// Creates a connector that knows no targets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `target` answer the handshake with `capabilities`.
    pub fn serve(&self, target: &ProviderTarget, capabilities: Vec<CapabilityDefinition>) {
        self.set_behaviour(target, InMemoryTargetBehaviour::Serve(capabilities));
    }

    /// Makes connection attempts to `target` fail with `reason`.
    pub fn fail(&self, target: &ProviderTarget, reason: ConnectionFailure) {
        self.set_behaviour(target, InMemoryTargetBehaviour::Fail(reason));
    }

    /// Makes `target` accept the connection but never finish the handshake.
    pub fn hang(&self, target: &ProviderTarget) {
        self.set_behaviour(target, InMemoryTargetBehaviour::Hang);
    }

    /// Sets the behaviour for `target`, replacing any previous one.
    pub fn set_behaviour(&self, target: &ProviderTarget, behaviour: InMemoryTargetBehaviour) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .behaviours
            .insert(target.describe(), behaviour);
    }

    /// Delays every handshake by `delay`.
    pub fn set_open_delay(&self, delay: Duration) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .open_delay = delay;
    }

    /// Delays every binding close by `delay`.
    pub fn set_close_delay(&self, delay: Duration) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .close_delay = delay;
    }

    /// Makes bindings opened from now on report an error when closed.
    ///
    /// The binding still releases everything it holds.
    pub fn set_close_failure(&self, fails: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .close_fails = fails;
    }

    /// Returns how many bindings were successfully opened.
    #[must_use]
    pub fn opened_count(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    /// Returns how many opened bindings have not been closed yet.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    /// Returns how many invocations reached an open binding.
    #[must_use]
    pub fn invocation_count(&self) -> usize {
        self.counters.invocations.load(Ordering::SeqCst)
    }

    fn lookup(
        &self,
        target: &ProviderTarget,
    ) -> (Option<InMemoryTargetBehaviour>, Duration, CloseScript) {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        (
            state.behaviours.get(&target.describe()).cloned(),
            state.open_delay,
            CloseScript {
                delay: state.close_delay,
                fails: state.close_fails,
            },
        )
    }
}

#[async_trait]
impl TransportConnector for InMemoryConnector {
    async fn open(
        &self,
        provider_id: &ProviderId,
        target: &ProviderTarget,
    ) -> Result<OpenedBinding, ConnectionError> {
        let (behaviour, open_delay, close) = self.lookup(target);
        if !open_delay.is_zero() {
            tokio::time::sleep(open_delay).await;
        }

        let capabilities = match behaviour {
            Some(InMemoryTargetBehaviour::Serve(capabilities)) => capabilities,
            Some(InMemoryTargetBehaviour::Fail(reason)) => {
                return Err(ConnectionError::new(
                    provider_id.clone(),
                    reason,
                    format!("scripted failure for {}", target.describe()),
                ));
            }
            Some(InMemoryTargetBehaviour::Hang) => {
                return std::future::pending().await;
            }
            None => {
                return Err(ConnectionError::new(
                    provider_id.clone(),
                    ConnectionFailure::UnreachableTarget,
                    format!("no in-memory provider at {}", target.describe()),
                ));
            }
        };

        let signal = Arc::new(CloseSignal::default());
        let invoker = Arc::new(InMemoryInvoker {
            provider_id: provider_id.clone(),
            signal: signal.clone(),
            counters: self.counters.clone(),
        });
        let descriptors = capabilities
            .into_iter()
            .map(|definition| {
                CapabilityDescriptor::new(provider_id.clone(), definition, invoker.clone())
                    .map_err(|err| {
                        ConnectionError::new(
                            provider_id.clone(),
                            ConnectionFailure::HandshakeRejected,
                            err.to_string(),
                        )
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        self.counters.live.fetch_add(1, Ordering::SeqCst);
        Ok(OpenedBinding {
            binding: Box::new(InMemoryBinding {
                kind: target.kind(),
                signal,
                counters: self.counters.clone(),
                close,
            }),
            descriptors,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct CloseScript {
    delay: Duration,
    fails: bool,
}

#[derive(Debug, Default)]
struct CloseSignal {
    closed: AtomicBool,
    notify: Notify,
}

impl CloseSignal {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Echoing invoker bound to one in-memory binding.
///
/// An argument `delay_ms` holds the call open for that long, which lets
/// tests close the binding while a call is in flight.
struct InMemoryInvoker {
    provider_id: ProviderId,
    signal: Arc<CloseSignal>,
    counters: Arc<Counters>,
}

impl InMemoryInvoker {
    fn closed_error(&self, capability: &str) -> InvocationError {
        InvocationError::connection_closed(format!(
            "provider {} closed while calling {capability}",
            self.provider_id
        ))
    }
}

#[async_trait]
impl CapabilityInvoker for InMemoryInvoker {
    async fn invoke(
        &self,
        capability: &str,
        arguments: Value,
    ) -> Result<CapabilityOutput, InvocationError> {
        let notified = self.signal.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.signal.is_closed() {
            return Err(self.closed_error(capability));
        }
        self.counters.invocations.fetch_add(1, Ordering::SeqCst);

        if let Some(delay_ms) = arguments.get("delay_ms").and_then(Value::as_u64) {
            tokio::select! {
                () = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                () = &mut notified => return Err(self.closed_error(capability)),
            }
        }

        let content = json!([{
            "type": "text",
            "text": format!("{}:{capability} {arguments}", self.provider_id),
        }]);
        Ok(CapabilityOutput::new(
            format!("{}:{capability} {arguments}", self.provider_id),
            content,
        ))
    }
}

struct InMemoryBinding {
    kind: TransportKind,
    signal: Arc<CloseSignal>,
    counters: Arc<Counters>,
    close: CloseScript,
}

#[async_trait]
impl TransportBinding for InMemoryBinding {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn close(&mut self) -> TransportCloseResult {
        if self.signal.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.signal.notify.notify_waiters();
        if !self.close.delay.is_zero() {
            tokio::time::sleep(self.close.delay).await;
        }
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
        if self.close.fails {
            return Err(TransportCloseError::runtime(std::io::Error::other(
                "scripted close failure",
            )));
        }
        Ok(())
    }
}
