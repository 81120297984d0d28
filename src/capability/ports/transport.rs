//! Transport port for opening and closing provider bindings.

use crate::capability::domain::{
    CapabilityDescriptor, ConnectionError, ProviderId, ProviderTarget, TransportKind,
};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for binding teardown.
pub type TransportCloseResult = Result<(), TransportCloseError>;

/// A freshly opened binding and the capabilities its provider advertised.
pub struct OpenedBinding {
    /// Binding handle, owned by the connection manager from here on.
    pub binding: Box<dyn TransportBinding>,
    /// Full capability set reported during the discovery handshake.
    pub descriptors: Vec<CapabilityDescriptor>,
}

impl fmt::Debug for OpenedBinding {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("OpenedBinding")
            .field("kind", &self.binding.kind())
            .field("descriptors", &self.descriptors)
            .finish()
    }
}

/// Opens provider bindings and performs capability discovery.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Opens a binding to `target` and returns its advertised capabilities.
    ///
    /// Implementations must leave no process or connection behind when they
    /// fail or when the returned future is dropped before completion.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] with a `handshake_timeout`,
    /// `unreachable_target`, `spawn_failed` or `handshake_rejected` reason.
    async fn open(
        &self,
        provider_id: &ProviderId,
        target: &ProviderTarget,
    ) -> Result<OpenedBinding, ConnectionError>;
}

/// Live channel to one provider.
#[async_trait]
pub trait TransportBinding: Send + Sync {
    /// Returns the connection kind.
    fn kind(&self) -> TransportKind;

    /// Returns the child process id for piped bindings.
    fn process_id(&self) -> Option<u32> {
        None
    }

    /// Closes the binding. Calling this on a closed binding is a no-op.
    ///
    /// Every invocation in flight on the binding fails with
    /// `connection_closed` once this starts.
    async fn close(&mut self) -> TransportCloseResult;
}

/// Errors returned while closing a binding.
#[derive(Debug, Clone, Error)]
pub enum TransportCloseError {
    /// The provider process could not be signalled or reaped.
    #[error("failed to stop provider process: {0}")]
    Process(Arc<dyn std::error::Error + Send + Sync>),

    /// Generic transport failure.
    #[error("transport error while closing: {0}")]
    Runtime(Arc<dyn std::error::Error + Send + Sync>),
}

impl TransportCloseError {
    /// Wraps a process-management failure.
    pub fn process(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Process(Arc::new(err))
    }

    /// Wraps a generic transport failure.
    pub fn runtime(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Runtime(Arc::new(err))
    }
}
