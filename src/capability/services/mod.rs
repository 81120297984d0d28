//! Services for the capability registry, connection lifecycle and control.

mod control;
mod manager;
mod registry;

pub use control::{
    ControlCommand, ControlOutcome, ControlParseError, ControlStatus, ControlSurface,
};
pub use manager::{
    ConnectionSettings, ProviderConnectionManager, TeardownFailure, TeardownReport,
};
pub use registry::{CapabilityRegistry, CapabilitySnapshot};
