//! Adapter implementations for orchestrator ports.

pub mod memory;

pub use memory::ScriptedReasoner;
