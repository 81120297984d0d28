//! Identifier and validated-name types for providers and capabilities.

use super::{CapabilityDomainError, ProviderTarget};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Maximum length for a provider identifier.
const MAX_PROVIDER_ID_LENGTH: usize = 100;

/// Maximum length of the human-readable part of a derived provider id.
const DERIVED_SLUG_LENGTH: usize = 48;

/// Number of digest bytes appended to a derived provider id.
const DERIVED_DIGEST_BYTES: usize = 4;

/// Separator between provider id and capability name in a qualified name.
const QUALIFIED_SEPARATOR: char = ':';

/// Validated provider identifier, unique per active connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderId(String);

impl ProviderId {
    /// Creates a validated provider id.
    ///
    /// The input is trimmed and lowercased. Only characters in `[a-z0-9_-]`
    /// are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityDomainError`] when validation fails.
    pub fn new(value: impl Into<String>) -> Result<Self, CapabilityDomainError> {
        let normalized = value.into().trim().to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(CapabilityDomainError::EmptyProviderId);
        }

        let is_valid = normalized.chars().all(|character| {
            character.is_ascii_lowercase()
                || character.is_ascii_digit()
                || character == '_'
                || character == '-'
        });
        if !is_valid {
            return Err(CapabilityDomainError::InvalidProviderId(normalized));
        }

        if normalized.len() > MAX_PROVIDER_ID_LENGTH {
            return Err(CapabilityDomainError::ProviderIdTooLong(normalized));
        }

        Ok(Self(normalized))
    }

    /// Derives a provider id from a connection target.
    ///
    /// The result is a slug of the target's command line or URL followed by
    /// the first eight hex digits of the target's SHA-256, so distinct
    /// targets never collide even when their slugs do.
    #[must_use]
    pub fn derive_from(target: &ProviderTarget) -> Self {
        let description = target.describe();
        let mut slug = String::with_capacity(DERIVED_SLUG_LENGTH);
        let mut previous_was_separator = true;
        for character in description
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .chars()
        {
            if slug.len() >= DERIVED_SLUG_LENGTH {
                break;
            }
            if character.is_ascii_alphanumeric() {
                slug.push(character.to_ascii_lowercase());
                previous_was_separator = false;
            } else if !previous_was_separator {
                slug.push('_');
                previous_was_separator = true;
            }
        }

        let digest = Sha256::digest(description.as_bytes());
        let suffix: String = digest
            .iter()
            .take(DERIVED_DIGEST_BYTES)
            .map(|byte| format!("{byte:02x}"))
            .collect();

        let trimmed_slug = slug.trim_end_matches('_');
        if trimmed_slug.is_empty() {
            Self(format!("provider_{suffix}"))
        } else {
            Self(format!("{trimmed_slug}_{suffix}"))
        }
    }

    /// Returns the provider id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ProviderId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<String> for ProviderId {
    type Error = CapabilityDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProviderId> for String {
    fn from(value: ProviderId) -> Self {
        value.0
    }
}

/// Capability name disambiguated by its owning provider.
///
/// Renders as `<provider_id>:<capability>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    provider_id: ProviderId,
    capability: String,
}

impl QualifiedName {
    /// Creates a qualified name.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityDomainError::EmptyCapabilityName`] when the
    /// capability name is empty after trimming.
    pub fn new(
        provider_id: ProviderId,
        capability: impl Into<String>,
    ) -> Result<Self, CapabilityDomainError> {
        let normalized = capability.into().trim().to_owned();
        if normalized.is_empty() {
            return Err(CapabilityDomainError::EmptyCapabilityName);
        }
        Ok(Self {
            provider_id,
            capability: normalized,
        })
    }

    /// Parses `<provider_id>:<capability>`, splitting at the first `:`.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityDomainError`] when the separator is missing or
    /// either half fails validation.
    pub fn parse(value: &str) -> Result<Self, CapabilityDomainError> {
        let Some((provider, capability)) = value.split_once(QUALIFIED_SEPARATOR) else {
            return Err(CapabilityDomainError::MalformedQualifiedName(
                value.to_owned(),
            ));
        };
        Self::new(ProviderId::new(provider)?, capability)
    }

    /// Returns whether `value` carries a provider prefix.
    #[must_use]
    pub fn is_qualified(value: &str) -> bool {
        value.contains(QUALIFIED_SEPARATOR)
    }

    /// Returns the owning provider id.
    #[must_use]
    pub const fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    /// Returns the capability name as advertised by the provider.
    #[must_use]
    pub fn capability(&self) -> &str {
        &self.capability
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{}{QUALIFIED_SEPARATOR}{}",
            self.provider_id, self.capability
        )
    }
}

impl Serialize for QualifiedName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
