//! Reasoning/act loop integration for switchboard.
//!
//! The orchestrator drives reasoning cycles over the live capability
//! registry. Before each cycle it may swap in a situational instruction for
//! exactly that cycle, bootstraps configured providers once, and turns the
//! reasoner's requested calls into observations. It only reads the registry;
//! provider state is changed through the connection manager alone.
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
