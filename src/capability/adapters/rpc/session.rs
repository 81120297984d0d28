//! Request/reply correlation over a framed provider channel.

use super::protocol::{
    self, INVALID_PARAMS, Incoming, METHOD_NOT_FOUND, RpcErrorObject, RpcNotification,
    RpcRequest, RpcResponse,
};
use crate::capability::{
    domain::{CapabilityOutput, InvocationError, ProviderId},
    ports::CapabilityInvoker,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Serialized frame queued for the transport writer.
#[derive(Debug)]
pub(crate) struct OutboundFrame {
    /// Request id when the frame expects a reply.
    pub(crate) request_id: Option<u64>,
    /// Serialized JSON text.
    pub(crate) body: String,
}

/// Sender half used by sessions and readers to queue frames.
pub(crate) type FrameSender = mpsc::UnboundedSender<OutboundFrame>;

/// Errors returned by a single request.
#[derive(Debug, Error)]
pub(crate) enum RpcCallError {
    /// The session closed before a reply arrived.
    #[error("connection closed")]
    Closed,

    /// No reply arrived before the deadline.
    #[error("{method} timed out after {timeout_ms}ms")]
    TimedOut { method: String, timeout_ms: u128 },

    /// The provider replied with a JSON-RPC error.
    #[error("provider error {}: {}", .0.code, .0.message)]
    Remote(RpcErrorObject),

    /// The frame could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(String),

    /// The transport could not deliver the frame.
    #[error("failed to deliver frame: {0}")]
    Undelivered(String),
}

impl RpcCallError {
    /// Maps a call failure onto the invocation taxonomy.
    pub(crate) fn into_invocation_error(self, capability: &str) -> InvocationError {
        match self {
            Self::Closed => InvocationError::connection_closed(format!(
                "provider connection closed while calling {capability}"
            )),
            Self::TimedOut { .. } => InvocationError::timed_out(self.to_string()),
            Self::Remote(error) if error.code == INVALID_PARAMS => {
                InvocationError::invalid_arguments(error.message)
            }
            Self::Remote(error) => InvocationError::remote_fault(error.message),
            Self::Encode(detail) => InvocationError::invalid_arguments(detail),
            Self::Undelivered(detail) => InvocationError::connection_closed(detail),
        }
    }
}

type Waiter = oneshot::Sender<Result<Value, RpcCallError>>;

#[derive(Default)]
struct PendingState {
    closed: bool,
    waiters: HashMap<u64, Waiter>,
}

/// Table of requests awaiting a reply.
///
/// Closing the table fails every waiter with [`RpcCallError::Closed`] and
/// refuses new registrations, which is what makes stale and in-flight calls
/// on a closed binding fail instead of hang.
#[derive(Default)]
pub(crate) struct PendingCalls {
    state: Mutex<PendingState>,
}

impl PendingCalls {
    fn lock(&self) -> MutexGuard<'_, PendingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, id: u64) -> Option<oneshot::Receiver<Result<Value, RpcCallError>>> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        let (sender, receiver) = oneshot::channel();
        state.waiters.insert(id, sender);
        Some(receiver)
    }

    fn forget(&self, id: u64) {
        self.lock().waiters.remove(&id);
    }

    /// Delivers a reply to its waiter, if the waiter is still interested.
    pub(crate) fn resolve(&self, id: u64, outcome: Result<Value, RpcCallError>) {
        let waiter = self.lock().waiters.remove(&id);
        match waiter {
            Some(sender) => {
                // The caller may have given up already.
                let _abandoned = sender.send(outcome);
            }
            None => tracing::debug!(id, "discarding reply for unknown or abandoned request"),
        }
    }

    /// Fails every waiter and refuses further registrations.
    pub(crate) fn close(&self) {
        let drained: Vec<Waiter> = {
            let mut state = self.lock();
            state.closed = true;
            state.waiters.drain().map(|(_, waiter)| waiter).collect()
        };
        for waiter in drained {
            let _abandoned = waiter.send(Err(RpcCallError::Closed));
        }
    }

    /// Returns whether the table has been closed.
    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

struct ForgetOnDrop<'a> {
    pending: &'a PendingCalls,
    id: u64,
}

impl Drop for ForgetOnDrop<'_> {
    fn drop(&mut self) {
        self.pending.forget(self.id);
    }
}

/// Client side of a JSON-RPC conversation with one provider.
pub(crate) struct RpcSession {
    provider_id: ProviderId,
    outbound: FrameSender,
    pending: Arc<PendingCalls>,
    next_id: AtomicU64,
    call_timeout: Duration,
}

impl RpcSession {
    pub(crate) fn new(
        provider_id: ProviderId,
        outbound: FrameSender,
        pending: Arc<PendingCalls>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            provider_id,
            outbound,
            pending,
            next_id: AtomicU64::new(1),
            call_timeout,
        }
    }

    /// Sends a request and waits for its reply.
    pub(crate) async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, RpcCallError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let receiver = self.pending.register(id).ok_or(RpcCallError::Closed)?;
        let _forget = ForgetOnDrop {
            pending: &self.pending,
            id,
        };

        let body = serde_json::to_string(&RpcRequest::new(id, method, params))
            .map_err(|err| RpcCallError::Encode(err.to_string()))?;
        tracing::debug!(provider_id = %self.provider_id, id, method, "sending request");
        self.outbound
            .send(OutboundFrame {
                request_id: Some(id),
                body,
            })
            .map_err(|_| RpcCallError::Closed)?;

        match tokio::time::timeout(timeout, receiver).await {
            Err(_) => Err(RpcCallError::TimedOut {
                method: method.to_owned(),
                timeout_ms: timeout.as_millis(),
            }),
            Ok(Err(_)) => Err(RpcCallError::Closed),
            Ok(Ok(outcome)) => outcome,
        }
    }

    /// Sends a notification; no reply is expected.
    pub(crate) fn notify(&self, method: &str, params: Option<Value>) -> Result<(), RpcCallError> {
        if self.pending.is_closed() {
            return Err(RpcCallError::Closed);
        }
        let body = serde_json::to_string(&RpcNotification::new(method, params))
            .map_err(|err| RpcCallError::Encode(err.to_string()))?;
        tracing::debug!(provider_id = %self.provider_id, method, "sending notification");
        self.outbound
            .send(OutboundFrame {
                request_id: None,
                body,
            })
            .map_err(|_| RpcCallError::Closed)
    }

    /// Fails in-flight calls and refuses new ones.
    pub(crate) fn close(&self) {
        self.pending.close();
    }
}

#[async_trait]
impl CapabilityInvoker for RpcSession {
    async fn invoke(
        &self,
        capability: &str,
        arguments: Value,
    ) -> Result<CapabilityOutput, InvocationError> {
        let params = json!({ "name": capability, "arguments": arguments });
        let result = self
            .request("tools/call", Some(params), self.call_timeout)
            .await
            .map_err(|err| err.into_invocation_error(capability))?;
        protocol::parse_call_result(result)
    }
}

/// Fails every waiter once the provider's side of the channel has ended.
///
/// An orderly close shuts the table first, so an open table here means the
/// provider went away while still registered.
pub(crate) fn channel_ended(provider_id: &ProviderId, pending: &PendingCalls) {
    if pending.is_closed() {
        tracing::debug!(%provider_id, "provider channel closed");
        return;
    }
    tracing::warn!(
        %provider_id,
        "provider went away; its capabilities fail with connection_closed until it is disconnected"
    );
    pending.close();
}

/// Routes one incoming frame: replies to waiters, answers provider requests.
pub(crate) fn dispatch_frame(
    provider_id: &ProviderId,
    pending: &PendingCalls,
    outbound: &FrameSender,
    frame: &str,
) {
    let incoming = match protocol::classify(frame) {
        Ok(incoming) => incoming,
        Err(err) => {
            tracing::warn!(%provider_id, error = %err, "ignoring malformed frame");
            return;
        }
    };

    match incoming {
        Incoming::Reply { id, outcome } => {
            tracing::debug!(%provider_id, id, "received reply");
            pending.resolve(id, outcome.map_err(RpcCallError::Remote));
        }
        Incoming::Request { id, method } => {
            let response = if method == "ping" {
                RpcResponse::success(id, json!({}))
            } else {
                tracing::debug!(%provider_id, %method, "rejecting provider-initiated request");
                RpcResponse::failure(
                    id,
                    RpcErrorObject {
                        code: METHOD_NOT_FOUND,
                        message: format!("method '{method}' is not supported by this client"),
                    },
                )
            };
            match serde_json::to_string(&response) {
                Ok(body) => {
                    let _writer_gone = outbound.send(OutboundFrame {
                        request_id: None,
                        body,
                    });
                }
                Err(err) => tracing::warn!(%provider_id, error = %err, "failed to encode reply"),
            }
        }
        Incoming::Notification { method } => {
            tracing::debug!(%provider_id, %method, "ignoring provider notification");
        }
    }
}
