//! Operator-facing control surface with machine-readable outcomes.

use super::ProviderConnectionManager;
use crate::capability::{
    domain::{NotFoundError, ProviderId, ProviderTarget, TransportKind},
    ports::TransportConnector,
};
use mockable::Clock;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;

/// Whether a control action succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlStatus {
    /// The action completed.
    Ok,
    /// The action failed; `reason` says why.
    Failed,
}

/// Result of one control action, printed as one JSON line by the console.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlOutcome {
    /// Success or failure.
    pub status: ControlStatus,
    /// Action that produced the outcome.
    pub action: &'static str,
    /// Provider the action concerned, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<ProviderId>,
    /// Machine-readable failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human-readable failure detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Action-specific payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ControlOutcome {
    /// Creates a successful outcome.
    #[must_use]
    pub const fn ok(action: &'static str) -> Self {
        Self {
            status: ControlStatus::Ok,
            action,
            provider_id: None,
            reason: None,
            detail: None,
            data: None,
        }
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn failed(
        action: &'static str,
        reason: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            status: ControlStatus::Failed,
            action,
            provider_id: None,
            reason: Some(reason.into()),
            detail: Some(detail.into()),
            data: None,
        }
    }

    /// Attaches the provider the action concerned.
    #[must_use]
    pub fn with_provider(mut self, provider_id: ProviderId) -> Self {
        self.provider_id = Some(provider_id);
        self
    }

    /// Attaches an action-specific payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Returns whether the action succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == ControlStatus::Ok
    }

    /// Renders the outcome as a single JSON line.
    #[must_use]
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            json!({
                "status": "failed",
                "action": self.action,
                "reason": "encode_failed",
                "detail": err.to_string(),
            })
            .to_string()
        })
    }
}

/// Errors raised while parsing a console command line.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControlParseError {
    /// The line is empty.
    #[error("empty command")]
    Empty,
    /// The first word is not a known command.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    /// A command is missing a required operand.
    #[error("usage: {0}")]
    Usage(&'static str),
    /// The transport kind is neither piped nor streamed.
    #[error("unknown transport kind '{0}'")]
    UnknownKind(String),
    /// The target or the provider id failed validation.
    #[error("{0}")]
    InvalidOperand(String),
    /// Call arguments are not valid JSON.
    #[error("call arguments are not valid JSON: {0}")]
    InvalidArguments(String),
}

impl ControlParseError {
    /// Returns the machine-readable reason string.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::InvalidArguments(_) => "invalid_arguments",
            Self::Empty
            | Self::UnknownCommand(_)
            | Self::Usage(_)
            | Self::UnknownKind(_)
            | Self::InvalidOperand(_) => "invalid_command",
        }
    }
}

const CONNECT_USAGE: &str =
    "connect <id|-> piped <command> [args...] | connect <id|-> streamed <url>";
const DISCONNECT_USAGE: &str = "disconnect <id>";
const CALL_USAGE: &str = "call <name> [json-arguments]";

/// One console command.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// Connect a provider; `-` as id derives one from the target.
    Connect {
        /// Explicit provider id, if any.
        provider_id: Option<ProviderId>,
        /// Where and how to reach the provider.
        target: ProviderTarget,
    },
    /// Disconnect one provider.
    Disconnect(ProviderId),
    /// Disconnect every provider.
    DisconnectAll,
    /// List connections and capabilities.
    List,
    /// Invoke a capability by qualified or bare name.
    Call {
        /// Capability name.
        name: String,
        /// JSON arguments.
        arguments: Value,
    },
    /// Leave the console.
    Quit,
}

impl ControlCommand {
    /// Parses one console line.
    ///
    /// # Errors
    ///
    /// Returns [`ControlParseError`] when the line is not a valid command.
    pub fn parse(line: &str) -> Result<Self, ControlParseError> {
        let trimmed = line.trim();
        let (command, rest) = trimmed
            .split_once(char::is_whitespace)
            .map_or((trimmed, ""), |(head, tail)| (head, tail.trim()));

        match command {
            "" => Err(ControlParseError::Empty),
            "connect" => Self::parse_connect(rest),
            "disconnect" => {
                if rest.is_empty() {
                    return Err(ControlParseError::Usage(DISCONNECT_USAGE));
                }
                ProviderId::new(rest)
                    .map(Self::Disconnect)
                    .map_err(|err| ControlParseError::InvalidOperand(err.to_string()))
            }
            "disconnect-all" => Ok(Self::DisconnectAll),
            "list" => Ok(Self::List),
            "call" => Self::parse_call(rest),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(ControlParseError::UnknownCommand(other.to_owned())),
        }
    }

    fn parse_connect(rest: &str) -> Result<Self, ControlParseError> {
        let mut words = rest.split_whitespace();
        let (Some(id_word), Some(kind_word)) = (words.next(), words.next()) else {
            return Err(ControlParseError::Usage(CONNECT_USAGE));
        };
        let provider_id = match id_word {
            "-" => None,
            explicit => Some(
                ProviderId::new(explicit)
                    .map_err(|err| ControlParseError::InvalidOperand(err.to_string()))?,
            ),
        };
        let kind = TransportKind::parse(kind_word)
            .ok_or_else(|| ControlParseError::UnknownKind(kind_word.to_owned()))?;

        let Some(first) = words.next() else {
            return Err(ControlParseError::Usage(CONNECT_USAGE));
        };
        let target = match kind {
            TransportKind::Piped => ProviderTarget::piped(first, words.map(str::to_owned)),
            TransportKind::Streamed => ProviderTarget::streamed(first),
        }
        .map_err(|err| ControlParseError::InvalidOperand(err.to_string()))?;

        Ok(Self::Connect {
            provider_id,
            target,
        })
    }

    fn parse_call(rest: &str) -> Result<Self, ControlParseError> {
        let (name, raw_arguments) = rest
            .split_once(char::is_whitespace)
            .map_or((rest, ""), |(head, tail)| (head, tail.trim()));
        if name.is_empty() {
            return Err(ControlParseError::Usage(CALL_USAGE));
        }
        let arguments = if raw_arguments.is_empty() {
            json!({})
        } else {
            serde_json::from_str(raw_arguments)
                .map_err(|err| ControlParseError::InvalidArguments(err.to_string()))?
        };
        Ok(Self::Call {
            name: name.to_owned(),
            arguments,
        })
    }
}

/// Manual control surface over a connection manager.
///
/// Every action reports success or failure as a [`ControlOutcome`]; no
/// error escapes as a panic or an `Err`.
pub struct ControlSurface<C, K>
where
    C: TransportConnector,
    K: Clock + Send + Sync,
{
    manager: Arc<ProviderConnectionManager<C, K>>,
}

impl<C, K> ControlSurface<C, K>
where
    C: TransportConnector,
    K: Clock + Send + Sync,
{
    /// Creates a control surface.
    #[must_use]
    pub const fn new(manager: Arc<ProviderConnectionManager<C, K>>) -> Self {
        Self { manager }
    }

    /// Runs one parsed command. `Quit` is reported as a no-op success.
    pub async fn execute(&self, command: ControlCommand) -> ControlOutcome {
        match command {
            ControlCommand::Connect {
                provider_id,
                target,
            } => self.connect(provider_id, target).await,
            ControlCommand::Disconnect(provider_id) => self.disconnect(&provider_id).await,
            ControlCommand::DisconnectAll => self.disconnect_all().await,
            ControlCommand::List => self.list(),
            ControlCommand::Call { name, arguments } => self.call(&name, arguments).await,
            ControlCommand::Quit => ControlOutcome::ok("quit"),
        }
    }

    /// Parses and runs one console line.
    pub async fn execute_line(&self, line: &str) -> ControlOutcome {
        match ControlCommand::parse(line) {
            Ok(command) => self.execute(command).await,
            Err(err) => ControlOutcome::failed("parse", err.reason(), err.to_string()),
        }
    }

    /// Connects a provider.
    pub async fn connect(
        &self,
        provider_id: Option<ProviderId>,
        target: ProviderTarget,
    ) -> ControlOutcome {
        match self.manager.connect(provider_id, target).await {
            Ok(connected) => {
                let capabilities: Vec<String> = self
                    .manager
                    .registry()
                    .snapshot()
                    .descriptors()
                    .iter()
                    .filter(|descriptor| descriptor.provider_id() == &connected)
                    .map(|descriptor| descriptor.qualified_name().to_string())
                    .collect();
                ControlOutcome::ok("connect")
                    .with_provider(connected)
                    .with_data(json!({ "capabilities": capabilities }))
            }
            Err(err) => ControlOutcome::failed("connect", err.reason().as_str(), err.detail())
                .with_provider(err.provider_id().clone()),
        }
    }

    /// Disconnects one provider; unknown ids succeed.
    pub async fn disconnect(&self, provider_id: &ProviderId) -> ControlOutcome {
        match self.manager.disconnect(provider_id).await {
            Ok(()) => ControlOutcome::ok("disconnect").with_provider(provider_id.clone()),
            Err(err) => ControlOutcome::failed("disconnect", err.reason(), err.to_string())
                .with_provider(provider_id.clone()),
        }
    }

    /// Disconnects every provider and reports the teardown.
    pub async fn disconnect_all(&self) -> ControlOutcome {
        let report = self.manager.disconnect_all().await;
        let data = serde_json::to_value(&report).unwrap_or(Value::Null);
        ControlOutcome::ok("disconnect_all").with_data(data)
    }

    /// Lists connections and the current capability listing.
    #[must_use]
    pub fn list(&self) -> ControlOutcome {
        let snapshot = self.manager.registry().snapshot();
        let data = json!({
            "generation": snapshot.generation(),
            "connections": self.manager.connections(),
            "capabilities": snapshot.listing(),
        });
        ControlOutcome::ok("list").with_data(data)
    }

    /// Resolves and invokes a capability.
    pub async fn call(&self, name: &str, arguments: Value) -> ControlOutcome {
        let descriptor = match self.manager.registry().resolve(name) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                let reason = match err {
                    NotFoundError::Missing(_) => "not_found",
                    NotFoundError::Ambiguous { .. } => "ambiguous",
                };
                return ControlOutcome::failed("call", reason, err.to_string());
            }
        };

        let provider_id = descriptor.provider_id().clone();
        match descriptor.invoke(arguments).await {
            Ok(output) => ControlOutcome::ok("call").with_provider(provider_id).with_data(json!({
                "capability": descriptor.qualified_name(),
                "text": output.text(),
                "content": output.content(),
            })),
            Err(err) => ControlOutcome::failed("call", err.reason().as_str(), err.detail())
                .with_provider(provider_id),
        }
    }
}
