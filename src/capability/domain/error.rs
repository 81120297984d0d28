//! Error taxonomy for provider connections and capability dispatch.

use super::{ProviderId, QualifiedName};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Errors returned while constructing capability domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityDomainError {
    /// The provider identifier is empty after trimming.
    #[error("provider id must not be empty")]
    EmptyProviderId,

    /// The provider identifier contains characters outside `[a-z0-9_-]`.
    #[error(
        "provider id '{0}' contains invalid characters (only lowercase alphanumeric, '-' and '_' allowed)"
    )]
    InvalidProviderId(String),

    /// The provider identifier exceeds the 100-character limit.
    #[error("provider id exceeds 100 character limit: {0}")]
    ProviderIdTooLong(String),

    /// The piped command is empty.
    #[error("piped command must not be empty")]
    EmptyCommand,

    /// The piped working directory is empty after trimming.
    #[error("piped working directory must not be empty when provided")]
    EmptyWorkingDirectory,

    /// The streamed URL is empty.
    #[error("streamed provider URL must not be empty")]
    EmptyUrl,

    /// The streamed URL does not have an `http://` or `https://` prefix.
    #[error("streamed provider URL '{0}' must start with 'http://' or 'https://'")]
    InvalidUrl(String),

    /// A capability name is empty after trimming.
    #[error("capability name must not be empty")]
    EmptyCapabilityName,

    /// A qualified name is not of the form `<provider>:<capability>`.
    #[error("qualified capability name '{0}' must have the form '<provider>:<capability>'")]
    MalformedQualifiedName(String),
}

/// Machine-readable reason attached to a [`ConnectionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionFailure {
    /// No discovery response arrived within the handshake deadline.
    HandshakeTimeout,
    /// The streamed endpoint could not be reached or refused the stream.
    UnreachableTarget,
    /// A live or in-progress connection already uses the provider id.
    DuplicateProvider,
    /// The provider child process could not be started.
    SpawnFailed,
    /// The provider answered the handshake with an error or malformed data.
    HandshakeRejected,
}

impl ConnectionFailure {
    /// Returns the canonical reason string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HandshakeTimeout => "handshake_timeout",
            Self::UnreachableTarget => "unreachable_target",
            Self::DuplicateProvider => "duplicate_provider",
            Self::SpawnFailed => "spawn_failed",
            Self::HandshakeRejected => "handshake_rejected",
        }
    }
}

impl fmt::Display for ConnectionFailure {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Failure to establish a provider connection.
///
/// All reasons are recoverable: the caller may retry with a different target
/// or after disconnecting the stale provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("connection to provider {provider_id} failed ({reason}): {detail}")]
pub struct ConnectionError {
    provider_id: ProviderId,
    reason: ConnectionFailure,
    detail: String,
}

impl ConnectionError {
    /// Creates a connection error.
    #[must_use]
    pub fn new(provider_id: ProviderId, reason: ConnectionFailure, detail: impl Into<String>) -> Self {
        Self {
            provider_id,
            reason,
            detail: detail.into(),
        }
    }

    /// Returns the provider the connection was attempted for.
    #[must_use]
    pub const fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    /// Returns the machine-readable reason.
    #[must_use]
    pub const fn reason(&self) -> ConnectionFailure {
        self.reason
    }

    /// Returns the human-readable detail.
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

/// Machine-readable reason attached to an [`InvocationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationFailure {
    /// The owning binding was closed before or during the call.
    ConnectionClosed,
    /// The arguments do not satisfy the capability's input schema.
    InvalidArguments,
    /// The provider reported a failure while executing the capability.
    RemoteFault,
    /// The invocation deadline expired before a reply arrived.
    TimedOut,
}

impl InvocationFailure {
    /// Returns the canonical reason string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionClosed => "connection_closed",
            Self::InvalidArguments => "invalid_arguments",
            Self::RemoteFault => "remote_fault",
            Self::TimedOut => "timed_out",
        }
    }

    /// Returns whether the orchestrator may retry the call at its discretion.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        !matches!(self, Self::InvalidArguments)
    }
}

impl fmt::Display for InvocationFailure {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Failure to invoke a capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("capability invocation failed ({reason}): {detail}")]
pub struct InvocationError {
    reason: InvocationFailure,
    detail: String,
}

impl InvocationError {
    /// Creates an invocation error.
    #[must_use]
    pub fn new(reason: InvocationFailure, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }

    /// Creates a `connection_closed` error.
    #[must_use]
    pub fn connection_closed(detail: impl Into<String>) -> Self {
        Self::new(InvocationFailure::ConnectionClosed, detail)
    }

    /// Creates an `invalid_arguments` error.
    #[must_use]
    pub fn invalid_arguments(detail: impl Into<String>) -> Self {
        Self::new(InvocationFailure::InvalidArguments, detail)
    }

    /// Creates a `remote_fault` error.
    #[must_use]
    pub fn remote_fault(detail: impl Into<String>) -> Self {
        Self::new(InvocationFailure::RemoteFault, detail)
    }

    /// Creates a `timed_out` error.
    #[must_use]
    pub fn timed_out(detail: impl Into<String>) -> Self {
        Self::new(InvocationFailure::TimedOut, detail)
    }

    /// Returns the machine-readable reason.
    #[must_use]
    pub const fn reason(&self) -> InvocationFailure {
        self.reason
    }

    /// Returns the human-readable detail.
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

/// Lookup failure in the capability registry.
///
/// Always recoverable; signals the caller to take a fresh snapshot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotFoundError {
    /// No registered capability matches the requested name.
    #[error("capability '{0}' is not registered")]
    Missing(String),

    /// An unqualified name matches capabilities of several providers.
    #[error("capability '{name}' is exposed by several providers: {}", render_candidates(.candidates))]
    Ambiguous {
        /// The unqualified name that was requested.
        name: String,
        /// Qualified names of every matching capability.
        candidates: Vec<QualifiedName>,
    },
}

fn render_candidates(candidates: &[QualifiedName]) -> String {
    candidates
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure while tearing a provider connection down.
///
/// By the time this error is returned the connection record and the
/// provider's registry entries have already been removed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DisconnectError {
    /// The transport reported an error while closing.
    #[error("closing provider {provider_id} failed: {detail}")]
    CloseFailed {
        /// Provider whose binding failed to close.
        provider_id: ProviderId,
        /// Transport error description.
        detail: String,
    },

    /// The transport did not finish closing within the allowed time.
    #[error("closing provider {provider_id} did not finish within {timeout_ms}ms")]
    CloseTimedOut {
        /// Provider whose binding hung while closing.
        provider_id: ProviderId,
        /// Deadline that expired, in milliseconds.
        timeout_ms: u128,
    },
}

impl DisconnectError {
    /// Returns the machine-readable reason string.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::CloseFailed { .. } => "close_failed",
            Self::CloseTimedOut { .. } => "close_timed_out",
        }
    }
}
