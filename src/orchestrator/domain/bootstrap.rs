//! Bootstrap plan and its outcome.

use crate::capability::domain::{ConnectionFailure, ProviderId, ProviderTarget};
use serde::Serialize;

/// One validated provider entry from the bootstrap configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEntry {
    /// Position of the entry in the configuration file.
    pub index: usize,
    /// Explicit provider id; derived from the target when absent.
    pub provider_id: Option<ProviderId>,
    /// Where and how to reach the provider.
    pub target: ProviderTarget,
}

impl ProviderEntry {
    /// Creates an entry.
    #[must_use]
    pub const fn new(index: usize, provider_id: Option<ProviderId>, target: ProviderTarget) -> Self {
        Self {
            index,
            provider_id,
            target,
        }
    }
}

/// A configured provider that failed to connect during bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapFailure {
    /// Position of the entry in the configuration file.
    pub index: usize,
    /// Provider id used for the attempt.
    pub provider_id: ProviderId,
    /// Machine-readable reason.
    pub reason: ConnectionFailure,
    /// Human-readable detail.
    pub detail: String,
}

/// Outcome of the one-time provider bootstrap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    /// Providers connected, in configuration order.
    pub connected: Vec<ProviderId>,
    /// Providers that failed to connect.
    pub failed: Vec<BootstrapFailure>,
}

impl BootstrapReport {
    /// Returns whether every configured provider connected.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
