//! Shared world state for provider connection BDD scenarios.

use std::sync::Arc;

use mockable::DefaultClock;
use rstest::fixture;
use serde_json::json;
use switchboard::capability::{
    adapters::InMemoryConnector,
    domain::{
        CapabilityDefinition, CapabilityDomainError, CapabilityDescriptor, ConnectionError,
        NotFoundError, ProviderId, ProviderTarget,
    },
    services::{
        CapabilityRegistry, ConnectionSettings, ProviderConnectionManager, TeardownReport,
    },
};

/// Manager type used by the BDD world.
pub type TestManager = ProviderConnectionManager<InMemoryConnector, DefaultClock>;

/// Scenario world for provider connection behaviour tests.
pub struct ConnectionWorld {
    /// Scriptable transport shared with the manager.
    pub connector: InMemoryConnector,
    /// The connection manager under test.
    pub manager: Arc<TestManager>,
    /// Result of the last connection attempt.
    pub last_connect: Option<Result<ProviderId, ConnectionError>>,
    /// Result of the last name resolution.
    pub last_resolve: Option<Result<Arc<CapabilityDescriptor>, NotFoundError>>,
    /// Report of the last bulk teardown.
    pub last_teardown: Option<TeardownReport>,
}

impl ConnectionWorld {
    /// Creates a world with no providers served or connected.
    #[must_use]
    pub fn new() -> Self {
        let connector = InMemoryConnector::new();
        let manager = Arc::new(ProviderConnectionManager::new(
            Arc::new(connector.clone()),
            Arc::new(DefaultClock),
            Arc::new(CapabilityRegistry::new()),
            ConnectionSettings::default(),
        ));
        Self {
            connector,
            manager,
            last_connect: None,
            last_resolve: None,
            last_teardown: None,
        }
    }
}

impl Default for ConnectionWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> ConnectionWorld {
    ConnectionWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

/// Builds the piped target the in-memory connector keys behaviour on.
pub fn target(command: &str) -> Result<ProviderTarget, CapabilityDomainError> {
    ProviderTarget::piped(command, Vec::new())
}

/// Builds capability definitions from a comma-separated list of names.
pub fn definitions(names: &str) -> Result<Vec<CapabilityDefinition>, CapabilityDomainError> {
    split_list(names)
        .into_iter()
        .map(|name| {
            CapabilityDefinition::new(name, format!("{name} capability"), json!({"type": "object"}))
        })
        .collect()
}

/// Splits a comma-separated step argument, ignoring blanks.
pub fn split_list(value: &str) -> Vec<&str> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}
