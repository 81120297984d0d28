//! Bootstrap configuration.
//!
//! The configuration is a JSON document naming the providers to connect at
//! startup, the transport and teardown deadlines, and the orchestrator's run
//! limits. Provider entries are validated one at a time: a malformed entry is
//! logged and skipped, and the rest are kept in order. Every other section is
//! optional and defaults field by field.
//!
//! ```json
//! {
//!   "providers": [
//!     { "provider_id": "files", "kind": "piped", "command": "npx",
//!       "args": ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"] },
//!     { "kind": "streamed", "url": "http://127.0.0.1:8000/sse" }
//!   ],
//!   "timeouts": { "connect_ms": 30000, "handshake_ms": 10000 },
//!   "orchestrator": { "max_steps": 20, "recent_window": 3 }
//! }
//! ```

use crate::capability::{
    adapters::TransportSettings,
    domain::{CapabilityDomainError, PipedTarget, ProviderId, ProviderTarget, TransportKind},
    services::ConnectionSettings,
};
use crate::orchestrator::{domain::ProviderEntry, services::OrchestratorSettings};
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading the configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be opened or read.
    #[error("failed to read configuration {path}: {source}")]
    Read {
        /// Configuration path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid JSON or has the wrong top-level shape.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Reasons a single provider entry is rejected.
#[derive(Debug, Error)]
pub enum EntryError {
    /// The entry is not an object with the expected field types.
    #[error("malformed entry: {0}")]
    Shape(#[source] serde_json::Error),

    /// `kind` is not one of `piped`, `stdio`, `streamed` or `sse`.
    #[error("unknown kind '{0}'")]
    UnknownKind(String),

    /// A piped entry has no `command`.
    #[error("piped entry needs a command")]
    MissingCommand,

    /// A streamed entry has no `url`.
    #[error("streamed entry needs a url")]
    MissingUrl,

    /// A field failed domain validation.
    #[error(transparent)]
    Invalid(#[from] CapabilityDomainError),
}

/// Time kept inside `close_ms` for killing and reaping a stubborn provider.
const KILL_ALLOWANCE_MS: u64 = 250;

/// Deadlines, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Bound on one connect, handshake included.
    pub connect_ms: u64,
    /// Bound on the discovery handshake.
    pub handshake_ms: u64,
    /// Bound on one capability call.
    pub call_ms: u64,
    /// Grace period for a piped provider to exit after SIGTERM.
    pub close_grace_ms: u64,
    /// Bound on closing one binding.
    pub close_ms: u64,
    /// Bound on tearing every provider down.
    pub teardown_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 30_000,
            handshake_ms: 10_000,
            call_ms: 60_000,
            close_grace_ms: 2_000,
            close_ms: 5_000,
            teardown_ms: 10_000,
        }
    }
}

impl TimeoutConfig {
    /// Returns the deadlines used by the real transports.
    ///
    /// The close grace period is capped below `close_ms` so a provider that
    /// ignores SIGTERM is still killed and reaped before the close deadline.
    #[must_use]
    pub const fn transport_settings(&self) -> TransportSettings {
        let grace_cap = self.close_ms.saturating_sub(KILL_ALLOWANCE_MS);
        let close_grace_ms = if self.close_grace_ms < grace_cap {
            self.close_grace_ms
        } else {
            grace_cap
        };
        TransportSettings {
            handshake_timeout: Duration::from_millis(self.handshake_ms),
            call_timeout: Duration::from_millis(self.call_ms),
            close_grace: Duration::from_millis(close_grace_ms),
        }
    }

    /// Returns the deadlines used by the connection manager.
    #[must_use]
    pub const fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            connect_timeout: Duration::from_millis(self.connect_ms),
            close_timeout: Duration::from_millis(self.close_ms),
            teardown_timeout: Duration::from_millis(self.teardown_ms),
        }
    }
}

/// One situational instruction rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OverrideConfig {
    /// Bare or qualified capability name to watch for.
    pub capability: String,
    /// `minijinja` template with `capability` and `standing` variables.
    pub template: String,
}

/// Orchestrator run limits and instructions.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum cycles per run.
    pub max_steps: u32,
    /// Maximum characters kept from one observation.
    pub max_observe: usize,
    /// History records inspected by overrides.
    pub recent_window: usize,
    /// Standing instruction text.
    pub instruction: String,
    /// Situational instruction rules, first match wins.
    pub overrides: Vec<OverrideConfig>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let settings = OrchestratorSettings::default();
        Self {
            max_steps: settings.max_steps,
            max_observe: settings.max_observe,
            recent_window: settings.recent_window,
            instruction: String::new(),
            overrides: Vec::new(),
        }
    }
}

impl OrchestratorConfig {
    /// Returns run limits with the given per-call deadline.
    #[must_use]
    pub const fn settings(&self, call_timeout: Option<Duration>) -> OrchestratorSettings {
        OrchestratorSettings {
            max_steps: self.max_steps,
            max_observe: self.max_observe,
            recent_window: self.recent_window,
            call_timeout,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    providers: Vec<Value>,
    #[serde(default)]
    timeouts: TimeoutConfig,
    #[serde(default)]
    orchestrator: OrchestratorConfig,
}

#[derive(Debug, Deserialize)]
struct RawProviderEntry {
    #[serde(default, alias = "id")]
    provider_id: Option<String>,
    kind: String,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    working_directory: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Loaded and validated configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchboardConfig {
    /// Valid provider entries, in file order.
    pub providers: Vec<ProviderEntry>,
    /// Deadlines.
    pub timeouts: TimeoutConfig,
    /// Orchestrator limits.
    pub orchestrator: OrchestratorConfig,
}

impl SwitchboardConfig {
    /// Reads and validates the configuration at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or is not a JSON
    /// object of the expected shape. Malformed provider entries are skipped,
    /// not reported as errors.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let read_error = |source| ConfigError::Read {
            path: path.to_owned(),
            source,
        };
        let file_name = path.file_name().ok_or_else(|| {
            read_error(std::io::Error::other("path must include a file name"))
        })?;
        let parent = path
            .parent()
            .filter(|dir| !dir.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(read_error)?;
        let text = dir.read_to_string(file_name).map_err(read_error)?;
        let config = Self::from_json_str(&text)?;
        tracing::debug!(
            %path,
            providers = config.providers.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Parses and validates a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the document has the wrong shape.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(text)?;
        let providers = raw
            .providers
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| match parse_entry(index, value) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::warn!(index, error = %err, "skipping provider entry");
                    None
                }
            })
            .collect();
        Ok(Self {
            providers,
            timeouts: raw.timeouts,
            orchestrator: raw.orchestrator,
        })
    }

    /// Returns the deadlines used by the real transports.
    #[must_use]
    pub const fn transport_settings(&self) -> TransportSettings {
        self.timeouts.transport_settings()
    }

    /// Returns the deadlines used by the connection manager.
    #[must_use]
    pub const fn connection_settings(&self) -> ConnectionSettings {
        self.timeouts.connection_settings()
    }
}

fn parse_entry(index: usize, value: Value) -> Result<ProviderEntry, EntryError> {
    let raw: RawProviderEntry = serde_json::from_value(value).map_err(EntryError::Shape)?;
    let kind = TransportKind::parse(&raw.kind).ok_or_else(|| EntryError::UnknownKind(raw.kind.clone()))?;
    let provider_id = raw.provider_id.map(ProviderId::new).transpose()?;

    let target = match kind {
        TransportKind::Piped => {
            let command = raw.command.ok_or(EntryError::MissingCommand)?;
            let piped = PipedTarget::new(command)?
                .with_args(raw.args)
                .with_env(raw.env);
            let configured = match raw.working_directory {
                Some(directory) => piped.with_working_directory(directory)?,
                None => piped,
            };
            ProviderTarget::Piped(configured)
        }
        TransportKind::Streamed => ProviderTarget::streamed(raw.url.ok_or(EntryError::MissingUrl)?)?,
    };
    Ok(ProviderEntry::new(index, provider_id, target))
}
