//! Transport adapters for provider connections.

pub mod memory;
pub mod piped;
pub(crate) mod rpc;
pub mod router;
pub mod streamed;

pub use memory::{InMemoryConnector, InMemoryTargetBehaviour};
pub use piped::{PipedBinding, PipedConnector};
pub use router::TransportRouter;
pub use streamed::{StreamedBinding, StreamedConnector};

use std::time::Duration;

/// Deadlines applied by the real transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSettings {
    /// Deadline for the whole discovery handshake.
    pub handshake_timeout: Duration,
    /// Deadline for one capability invocation.
    pub call_timeout: Duration,
    /// How long a piped provider may take to exit after being asked to.
    pub close_grace: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            call_timeout: Duration::from_secs(60),
            close_grace: Duration::from_secs(2),
        }
    }
}
