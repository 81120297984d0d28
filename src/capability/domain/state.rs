//! Per-provider connection lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection lifecycle state of a provider.
///
/// `Connecting` and `Disconnecting` are transient: the capability registry
/// only ever reflects a provider as absent (`Unconnected`) or present
/// (`Connected`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderConnectionState {
    /// No connection exists for the provider id.
    Unconnected,
    /// A binding is being opened and the discovery handshake is running.
    Connecting,
    /// The binding is open and its capabilities are registered.
    Connected,
    /// The binding is being closed.
    Disconnecting,
}

impl ProviderConnectionState {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unconnected => "unconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
        }
    }

    /// Returns whether a new `connect` may claim the provider id.
    #[must_use]
    pub const fn accepts_connect(self) -> bool {
        matches!(self, Self::Unconnected)
    }

    /// Returns whether transition to `target` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Unconnected, Self::Connecting)
                | (Self::Connecting, Self::Connected | Self::Unconnected)
                | (Self::Connected, Self::Disconnecting)
                | (Self::Disconnecting, Self::Unconnected)
        )
    }
}

impl fmt::Display for ProviderConnectionState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
