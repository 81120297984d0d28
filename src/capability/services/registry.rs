//! Keyed, insertion-ordered index of every dispatchable capability.

use crate::capability::domain::{
    CapabilityDescriptor, CapabilityListing, NotFoundError, ProviderId, QualifiedName,
};
use indexmap::IndexMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Immutable view of the registry at one instant.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySnapshot {
    generation: u64,
    descriptors: Vec<Arc<CapabilityDescriptor>>,
}

impl CapabilitySnapshot {
    /// Returns the registry generation the snapshot was taken at.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the descriptors in insertion order.
    #[must_use]
    pub fn descriptors(&self) -> &[Arc<CapabilityDescriptor>] {
        &self.descriptors
    }

    /// Returns the qualified names in insertion order.
    #[must_use]
    pub fn qualified_names(&self) -> Vec<QualifiedName> {
        self.descriptors
            .iter()
            .map(|descriptor| descriptor.qualified_name().clone())
            .collect()
    }

    /// Returns the listing presented to the reasoning layer.
    #[must_use]
    pub fn listing(&self) -> Vec<CapabilityListing> {
        self.descriptors
            .iter()
            .map(|descriptor| descriptor.listing())
            .collect()
    }

    /// Returns the number of capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns whether the snapshot holds no capabilities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Resolves a qualified or bare name within this snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundError`] under the same rules as
    /// [`CapabilityRegistry::resolve`].
    pub fn resolve(&self, name: &str) -> Result<Arc<CapabilityDescriptor>, NotFoundError> {
        let exact = QualifiedName::parse(name).ok().and_then(|qualified| {
            self.descriptors
                .iter()
                .find(|descriptor| descriptor.qualified_name() == &qualified)
        });
        match exact {
            Some(descriptor) => Ok(Arc::clone(descriptor)),
            None => resolve_bare(name, self.descriptors.iter()),
        }
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    generation: u64,
    entries: IndexMap<QualifiedName, Arc<CapabilityDescriptor>>,
}

impl RegistryState {
    fn bump(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

/// Capability registry shared by the connection manager and the orchestrator.
///
/// Every operation runs under one lock, so a snapshot observes either all or
/// none of a concurrent [`CapabilityRegistry::add_all`] batch.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    state: RwLock<RegistryState>,
}

impl CapabilityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // No operation leaves the map half-updated across a panic point, so a
    // poisoned lock still guards consistent data.
    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes a provider's capability set, replacing its previous one.
    ///
    /// Entries that survive keep their position; new ones are appended.
    /// Descriptors that belong to a different provider are ignored. Returns
    /// the number of entries the provider now has.
    pub fn add_all(
        &self,
        provider_id: &ProviderId,
        descriptors: Vec<CapabilityDescriptor>,
    ) -> usize {
        let incoming: IndexMap<QualifiedName, Arc<CapabilityDescriptor>> = descriptors
            .into_iter()
            .filter(|descriptor| {
                let owned = descriptor.provider_id() == provider_id;
                if !owned {
                    tracing::warn!(
                        %provider_id,
                        capability = %descriptor.qualified_name(),
                        "ignoring descriptor published for another provider"
                    );
                }
                owned
            })
            .map(|descriptor| (descriptor.qualified_name().clone(), Arc::new(descriptor)))
            .collect();
        let count = incoming.len();

        let mut state = self.write();
        state
            .entries
            .retain(|name, _| name.provider_id() != provider_id || incoming.contains_key(name));
        for (name, descriptor) in incoming {
            state.entries.insert(name, descriptor);
        }
        state.bump();
        count
    }

    /// Removes every entry owned by `provider_id` and returns how many went.
    pub fn remove_provider(&self, provider_id: &ProviderId) -> usize {
        let mut state = self.write();
        let before = state.entries.len();
        state
            .entries
            .retain(|name, _| name.provider_id() != provider_id);
        let removed = before.saturating_sub(state.entries.len());
        if removed > 0 {
            state.bump();
        }
        removed
    }

    /// Empties the registry and returns how many entries went.
    pub fn remove_all(&self) -> usize {
        let mut state = self.write();
        let removed = state.entries.len();
        if removed > 0 {
            state.entries.clear();
            state.bump();
        }
        removed
    }

    /// Returns an atomic, insertion-ordered snapshot.
    #[must_use]
    pub fn snapshot(&self) -> CapabilitySnapshot {
        let state = self.read();
        CapabilitySnapshot {
            generation: state.generation,
            descriptors: state.entries.values().cloned().collect(),
        }
    }

    /// Resolves a capability by name.
    ///
    /// A qualified name (`provider:tool`) matches exactly. Otherwise the name
    /// is compared against bare capability names and must match exactly one
    /// provider.
    ///
    /// # Errors
    ///
    /// Returns [`NotFoundError::Missing`] when nothing matches and
    /// [`NotFoundError::Ambiguous`] when a bare name matches several
    /// providers.
    pub fn resolve(&self, name: &str) -> Result<Arc<CapabilityDescriptor>, NotFoundError> {
        let state = self.read();
        if let Some(descriptor) = QualifiedName::parse(name)
            .ok()
            .and_then(|qualified| state.entries.get(&qualified))
        {
            return Ok(Arc::clone(descriptor));
        }
        resolve_bare(name, state.entries.values())
    }

    /// Returns the current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    /// Returns the number of registered capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    /// Returns whether no capability is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }
}

fn resolve_bare<'a>(
    name: &str,
    descriptors: impl Iterator<Item = &'a Arc<CapabilityDescriptor>>,
) -> Result<Arc<CapabilityDescriptor>, NotFoundError> {
    let bare = name.trim();
    let mut matches: Vec<&Arc<CapabilityDescriptor>> = descriptors
        .filter(|descriptor| descriptor.name() == bare)
        .collect();

    match matches.len() {
        0 => Err(NotFoundError::Missing(name.to_owned())),
        1 => matches
            .pop()
            .map(Arc::clone)
            .ok_or_else(|| NotFoundError::Missing(name.to_owned())),
        _ => Err(NotFoundError::Ambiguous {
            name: bare.to_owned(),
            candidates: matches
                .into_iter()
                .map(|descriptor| descriptor.qualified_name().clone())
                .collect(),
        }),
    }
}
