//! Switchboard: runtime capability orchestration across tool providers.
//!
//! This crate connects an agent to external tool providers while it runs,
//! over piped (child process) and streamed (HTTP with server-sent events)
//! transports. It merges every provider's capabilities into one registry
//! with atomic snapshots, routes each call back to the owning provider, and
//! drives reasoning cycles that always see the current capability set.
//!
//! # Architecture
//!
//! Switchboard follows hexagonal architecture principles:
//!
//! - **Domain**: Pure types and invariants with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for transports and collaborators
//! - **Adapters**: Concrete implementations of ports (child processes, HTTP)
//!
//! # Modules
//!
//! - [`capability`]: Provider connections, capability registry and dispatch
//! - [`orchestrator`]: Reasoning loop, bootstrap and shutdown hook
//! - [`config`]: Bootstrap configuration loading
//! - [`telemetry`]: Tracing subscriber setup

pub mod capability;
pub mod config;
pub mod orchestrator;
pub mod telemetry;
