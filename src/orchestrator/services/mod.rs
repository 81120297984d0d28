//! Application services for the reasoning loop.

mod bootstrap;
mod cycle;
mod overrides;
mod shutdown;

pub use bootstrap::{ProviderBootstrap, connect_all};
pub use cycle::{Orchestrator, OrchestratorSettings};
pub use overrides::RecentCapabilityOverride;
pub use shutdown::ShutdownHook;
