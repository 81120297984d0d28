//! Step definitions for provider connection scenarios.

pub mod given;
pub mod then;
pub mod when;
pub mod world;
