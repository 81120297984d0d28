//! Built-in context overrides.

use crate::orchestrator::{
    domain::{InteractionRecord, OverrideError},
    ports::ContextOverride,
};
use minijinja::{Environment, context};

/// Swaps the instruction while a given capability was called recently.
///
/// The capability may be named bare (`browse`), matching it on any
/// provider, or qualified (`web:browse`), matching that provider only. The
/// template sees `capability` (the name as called) and `standing`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentCapabilityOverride {
    capability: String,
    template: String,
}

impl RecentCapabilityOverride {
    /// Creates an override for `capability` rendering `template`.
    #[must_use]
    pub fn new(capability: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            template: template.into(),
        }
    }

    /// Returns the watched capability name.
    #[must_use]
    pub fn capability(&self) -> &str {
        &self.capability
    }

    fn matches(&self, called: &str) -> bool {
        if called == self.capability {
            return true;
        }
        if self.capability.contains(':') {
            return false;
        }
        called
            .split_once(':')
            .is_some_and(|(_, bare)| bare == self.capability)
    }
}

impl ContextOverride for RecentCapabilityOverride {
    fn instruction(
        &self,
        standing: &str,
        recent: &[InteractionRecord],
    ) -> Result<Option<String>, OverrideError> {
        let Some(called) = recent
            .iter()
            .flat_map(InteractionRecord::requested_calls)
            .map(|call| call.name.as_str())
            .find(|name| self.matches(name))
        else {
            return Ok(None);
        };

        Environment::new()
            .render_str(
                &self.template,
                context! { capability => called, standing => standing },
            )
            .map(Some)
            .map_err(|err| OverrideError::Template {
                capability: self.capability.clone(),
                reason: err.to_string(),
            })
    }
}
