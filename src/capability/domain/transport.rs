//! Provider transport targets and kinds.

use super::CapabilityDomainError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Connection kind used to reach a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Persistent network stream to a URL.
    #[serde(alias = "sse")]
    Streamed,
    /// Child process spoken to over its standard streams.
    #[serde(alias = "stdio")]
    Piped,
}

impl TransportKind {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Streamed => "streamed",
            Self::Piped => "piped",
        }
    }

    /// Parses a kind, accepting `stdio` and `sse` as aliases.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "streamed" | "sse" => Some(Self::Streamed),
            "piped" | "stdio" => Some(Self::Piped),
            _ => None,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Launch settings for a provider hosted as a child process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipedTarget {
    command: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_directory: Option<String>,
}

impl PipedTarget {
    /// Creates a new piped target.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityDomainError::EmptyCommand`] when `command` is empty
    /// after trimming.
    pub fn new(command: impl Into<String>) -> Result<Self, CapabilityDomainError> {
        let normalized_command = command.into().trim().to_owned();
        if normalized_command.is_empty() {
            return Err(CapabilityDomainError::EmptyCommand);
        }

        Ok(Self {
            command: normalized_command,
            args: Vec::new(),
            env: BTreeMap::new(),
            working_directory: None,
        })
    }

    /// Replaces command-line arguments.
    #[must_use]
    pub fn with_args(mut self, values: impl IntoIterator<Item = String>) -> Self {
        self.args = values.into_iter().collect();
        self
    }

    /// Replaces extra process environment variables.
    #[must_use]
    pub fn with_env(mut self, values: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env = values.into_iter().collect();
        self
    }

    /// Sets an explicit working directory.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityDomainError::EmptyWorkingDirectory`] when the
    /// provided value is empty after trimming.
    pub fn with_working_directory(
        mut self,
        value: impl Into<String>,
    ) -> Result<Self, CapabilityDomainError> {
        let normalized = value.into().trim().to_owned();
        if normalized.is_empty() {
            return Err(CapabilityDomainError::EmptyWorkingDirectory);
        }

        self.working_directory = Some(normalized);
        Ok(self)
    }

    /// Returns the executable command.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns command-line arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns extra environment variables.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Returns the optional working directory.
    #[must_use]
    pub fn working_directory(&self) -> Option<&str> {
        self.working_directory.as_deref()
    }

    /// Returns the command line joined with spaces.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Settings for a provider reached over a persistent event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamedTarget {
    url: String,
}

impl StreamedTarget {
    /// Creates a new streamed target.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityDomainError`] when `url` is empty or does not
    /// start with `http://` or `https://`.
    pub fn new(url: impl Into<String>) -> Result<Self, CapabilityDomainError> {
        let normalized_url = url.into().trim().to_owned();
        if normalized_url.is_empty() {
            return Err(CapabilityDomainError::EmptyUrl);
        }

        let has_valid_prefix =
            normalized_url.starts_with("http://") || normalized_url.starts_with("https://");
        if !has_valid_prefix {
            return Err(CapabilityDomainError::InvalidUrl(normalized_url));
        }

        Ok(Self {
            url: normalized_url,
        })
    }

    /// Returns the stream URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Where and how to reach a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "config")]
pub enum ProviderTarget {
    /// Provider over a persistent event stream.
    Streamed(StreamedTarget),
    /// Provider as a child process over standard streams.
    Piped(PipedTarget),
}

impl ProviderTarget {
    /// Creates a `piped` target with arguments.
    ///
    /// # Errors
    ///
    /// Returns validation errors from [`PipedTarget::new`].
    pub fn piped(
        command: impl Into<String>,
        args: impl IntoIterator<Item = String>,
    ) -> Result<Self, CapabilityDomainError> {
        Ok(Self::Piped(PipedTarget::new(command)?.with_args(args)))
    }

    /// Creates a `streamed` target.
    ///
    /// # Errors
    ///
    /// Returns validation errors from [`StreamedTarget::new`].
    pub fn streamed(url: impl Into<String>) -> Result<Self, CapabilityDomainError> {
        Ok(Self::Streamed(StreamedTarget::new(url)?))
    }

    /// Returns the connection kind.
    #[must_use]
    pub const fn kind(&self) -> TransportKind {
        match self {
            Self::Streamed(_) => TransportKind::Streamed,
            Self::Piped(_) => TransportKind::Piped,
        }
    }

    /// Returns a human-readable description: the URL or the command line.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Streamed(streamed) => streamed.url().to_owned(),
            Self::Piped(piped) => piped.command_line(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("piped", Some(TransportKind::Piped))]
    #[case("STDIO", Some(TransportKind::Piped))]
    #[case("streamed", Some(TransportKind::Streamed))]
    #[case(" sse ", Some(TransportKind::Streamed))]
    #[case("websocket", None)]
    fn kind_parsing_accepts_aliases(#[case] input: &str, #[case] expected: Option<TransportKind>) {
        assert_eq!(TransportKind::parse(input), expected);
    }

    #[test]
    fn piped_target_rejects_blank_command() {
        assert_eq!(
            PipedTarget::new("   "),
            Err(CapabilityDomainError::EmptyCommand)
        );
    }

    #[test]
    fn piped_target_describes_command_line() {
        let target = ProviderTarget::piped("npx", ["-y".to_owned(), "server".to_owned()])
            .expect("valid piped target");
        assert_eq!(target.kind(), TransportKind::Piped);
        assert_eq!(target.describe(), "npx -y server");
    }

    #[rstest]
    #[case("", CapabilityDomainError::EmptyUrl)]
    #[case("ftp://host", CapabilityDomainError::InvalidUrl("ftp://host".to_owned()))]
    fn streamed_target_validates_url(#[case] input: &str, #[case] expected: CapabilityDomainError) {
        assert_eq!(StreamedTarget::new(input), Err(expected));
    }

    #[test]
    fn working_directory_must_not_be_blank() {
        let result = PipedTarget::new("server")
            .expect("valid command")
            .with_working_directory(" ");
        assert_eq!(result, Err(CapabilityDomainError::EmptyWorkingDirectory));
    }
}
