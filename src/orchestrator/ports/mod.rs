//! Port contracts for the reasoning loop's collaborators.

mod context;
mod reasoner;

pub use context::ContextOverride;
#[cfg(test)]
pub use reasoner::MockReasoner;
pub use reasoner::Reasoner;
