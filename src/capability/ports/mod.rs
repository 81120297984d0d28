//! Port contracts for provider transports and capability dispatch.

mod invoker;
mod transport;

pub use invoker::CapabilityInvoker;
#[cfg(test)]
pub use transport::MockTransportConnector;
pub use transport::{
    OpenedBinding, TransportBinding, TransportCloseError, TransportCloseResult, TransportConnector,
};
