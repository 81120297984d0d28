//! Capability orchestration core for switchboard.
//!
//! This module connects to external tool providers over piped (child process)
//! and streamed (HTTP + server-sent events) transports, merges the
//! capabilities they advertise into a single registry, and routes invocations
//! back to the owning provider. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
