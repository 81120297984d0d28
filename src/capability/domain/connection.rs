//! Connection record exposed for live providers.

use super::{ProviderId, ProviderTarget, TransportKind};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Read-only view of a live provider connection.
///
/// The binding itself stays inside the connection manager; this record only
/// carries what callers may inspect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionRecord {
    provider_id: ProviderId,
    target: ProviderTarget,
    connected_at: DateTime<Utc>,
    capability_count: usize,
    process_id: Option<u32>,
}

impl ConnectionRecord {
    /// Creates a connection record.
    #[must_use]
    pub const fn new(
        provider_id: ProviderId,
        target: ProviderTarget,
        connected_at: DateTime<Utc>,
        capability_count: usize,
    ) -> Self {
        Self {
            provider_id,
            target,
            connected_at,
            capability_count,
            process_id: None,
        }
    }

    /// Records the child process id of a piped provider.
    #[must_use]
    pub const fn with_process_id(mut self, process_id: Option<u32>) -> Self {
        self.process_id = process_id;
        self
    }

    /// Returns the provider id.
    #[must_use]
    pub const fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    /// Returns the connection target.
    #[must_use]
    pub const fn target(&self) -> &ProviderTarget {
        &self.target
    }

    /// Returns the connection kind.
    #[must_use]
    pub const fn kind(&self) -> TransportKind {
        self.target.kind()
    }

    /// Returns when the connection completed.
    #[must_use]
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Returns how many capabilities the provider advertised.
    #[must_use]
    pub const fn capability_count(&self) -> usize {
        self.capability_count
    }

    /// Returns the child process id for piped providers.
    #[must_use]
    pub const fn process_id(&self) -> Option<u32> {
        self.process_id
    }
}
