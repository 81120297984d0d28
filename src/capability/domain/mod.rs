//! Domain model for provider connections and capability discovery.
//!
//! The capability domain models provider identity, transport targets,
//! connection lifecycle states, discovered capability metadata, and the
//! error taxonomy surfaced to callers. Infrastructure concerns remain outside
//! this boundary.

mod connection;
mod descriptor;
mod error;
mod ids;
mod state;
mod transport;

pub use connection::ConnectionRecord;
pub use descriptor::{CapabilityDefinition, CapabilityDescriptor, CapabilityListing, CapabilityOutput};
pub use error::{
    CapabilityDomainError, ConnectionError, ConnectionFailure, DisconnectError, InvocationError,
    InvocationFailure, NotFoundError,
};
pub use ids::{ProviderId, QualifiedName};
pub use state::ProviderConnectionState;
pub use transport::{PipedTarget, ProviderTarget, StreamedTarget, TransportKind};
