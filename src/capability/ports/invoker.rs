//! Invocation route held by published capability descriptors.

use crate::capability::domain::{CapabilityOutput, InvocationError};
use async_trait::async_trait;
use serde_json::Value;

/// Routes a capability call to the binding that advertised it.
///
/// Implementations must fail with `connection_closed` once the owning
/// binding has been closed, including for calls that were already in flight.
#[async_trait]
pub trait CapabilityInvoker: Send + Sync {
    /// Invokes `capability` with already-validated `arguments`.
    async fn invoke(
        &self,
        capability: &str,
        arguments: Value,
    ) -> Result<CapabilityOutput, InvocationError>;
}
