//! Provider connection lifecycle: connect, disconnect and bulk teardown.

use super::CapabilityRegistry;
use crate::capability::{
    domain::{
        ConnectionError, ConnectionFailure, ConnectionRecord, DisconnectError,
        ProviderConnectionState, ProviderId, ProviderTarget,
    },
    ports::{TransportBinding, TransportConnector},
};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use mockable::Clock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Deadlines applied by the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Default bound on one `connect`, handshake included.
    pub connect_timeout: Duration,
    /// Bound on closing one binding.
    pub close_timeout: Duration,
    /// Overall bound on `disconnect_all`.
    pub teardown_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            close_timeout: Duration::from_secs(5),
            teardown_timeout: Duration::from_secs(10),
        }
    }
}

/// One provider that failed to close cleanly during teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownFailure {
    /// Provider whose binding failed to close.
    pub provider_id: ProviderId,
    /// Machine-readable reason.
    pub reason: &'static str,
    /// Human-readable detail.
    pub detail: String,
}

/// Outcome of [`ProviderConnectionManager::disconnect_all`].
///
/// Every listed provider has already left the connection table and the
/// registry, whatever happened to its binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    /// Providers whose binding closed cleanly.
    pub closed: Vec<ProviderId>,
    /// Providers whose binding reported a close failure.
    pub failed: Vec<TeardownFailure>,
    /// Providers still closing when the teardown deadline expired.
    pub abandoned: Vec<ProviderId>,
    /// Whether the overall teardown deadline expired.
    pub deadline_expired: bool,
}

impl TeardownReport {
    /// Returns whether every provider closed cleanly in time.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.abandoned.is_empty() && !self.deadline_expired
    }
}

struct LiveConnection {
    sequence: u64,
    record: ConnectionRecord,
    binding: Box<dyn TransportBinding>,
}

enum ProviderSlot {
    Connecting,
    Connected(LiveConnection),
    Disconnecting,
}

impl ProviderSlot {
    const fn state(&self) -> ProviderConnectionState {
        match self {
            Self::Connecting => ProviderConnectionState::Connecting,
            Self::Connected(_) => ProviderConnectionState::Connected,
            Self::Disconnecting => ProviderConnectionState::Disconnecting,
        }
    }
}

#[derive(Default)]
struct ConnectionTable {
    next_sequence: u64,
    slots: HashMap<ProviderId, ProviderSlot>,
}

/// Owns every transport binding and keeps the registry in step with them.
///
/// Lock order is connection table, then registry. No lock is held across an
/// await point; transient `Connecting` and `Disconnecting` slots reserve a
/// provider id while its binding is opened or closed.
pub struct ProviderConnectionManager<C, K>
where
    C: TransportConnector,
    K: Clock + Send + Sync,
{
    connector: Arc<C>,
    clock: Arc<K>,
    registry: Arc<CapabilityRegistry>,
    settings: ConnectionSettings,
    table: Mutex<ConnectionTable>,
}

impl<C, K> ProviderConnectionManager<C, K>
where
    C: TransportConnector,
    K: Clock + Send + Sync,
{
    /// Creates a manager publishing into `registry`.
    #[must_use]
    pub fn new(
        connector: Arc<C>,
        clock: Arc<K>,
        registry: Arc<CapabilityRegistry>,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            connector,
            clock,
            registry,
            settings,
            table: Mutex::new(ConnectionTable::default()),
        }
    }

    fn table(&self) -> MutexGuard<'_, ConnectionTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the registry this manager publishes into.
    #[must_use]
    pub const fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Returns the configured deadlines.
    #[must_use]
    pub const fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Connects a provider using the default connect deadline.
    ///
    /// See [`ProviderConnectionManager::connect_with_timeout`].
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] when the provider cannot be connected.
    pub async fn connect(
        &self,
        provider_id: Option<ProviderId>,
        target: ProviderTarget,
    ) -> Result<ProviderId, ConnectionError> {
        self.connect_with_timeout(provider_id, target, self.settings.connect_timeout)
            .await
    }

    /// Connects a provider and publishes its capabilities.
    ///
    /// When `provider_id` is `None` it is derived from the target. The
    /// provider's capabilities are visible to every snapshot taken after this
    /// returns `Ok`. On any failure, on expiry of `timeout` and when the
    /// returned future is dropped, nothing is left behind: no connection
    /// record, no registry entry and no open binding.
    ///
    /// # Errors
    ///
    /// Returns `duplicate_provider` when the id is connected or being
    /// connected or disconnected, `handshake_timeout` when `timeout`
    /// expires, and otherwise whatever the transport reports.
    pub async fn connect_with_timeout(
        &self,
        provider_id: Option<ProviderId>,
        target: ProviderTarget,
        timeout: Duration,
    ) -> Result<ProviderId, ConnectionError> {
        let id = provider_id.unwrap_or_else(|| ProviderId::derive_from(&target));
        let reservation = self.reserve(&id)?;
        let started = Instant::now();
        tracing::debug!(
            provider_id = %id,
            kind = %target.kind(),
            target = %target.describe(),
            "connecting provider"
        );

        let opened = match tokio::time::timeout(timeout, self.connector.open(&id, &target)).await {
            Ok(Ok(opened)) => opened,
            Ok(Err(err)) => {
                tracing::debug!(provider_id = %id, reason = %err.reason(), "connect failed");
                return Err(err);
            }
            Err(_) => {
                return Err(ConnectionError::new(
                    id,
                    ConnectionFailure::HandshakeTimeout,
                    format!("connect did not complete within {}ms", timeout.as_millis()),
                ));
            }
        };

        let capability_count = opened.descriptors.len();
        let record = ConnectionRecord::new(id.clone(), target, self.clock.utc(), capability_count)
            .with_process_id(opened.binding.process_id());
        {
            let mut table = self.table();
            let sequence = table.next_sequence;
            table.next_sequence = table.next_sequence.wrapping_add(1);
            self.registry.add_all(&id, opened.descriptors);
            table.slots.insert(
                id.clone(),
                ProviderSlot::Connected(LiveConnection {
                    sequence,
                    record,
                    binding: opened.binding,
                }),
            );
            reservation.commit();
        }

        tracing::info!(
            provider_id = %id,
            capabilities = capability_count,
            elapsed_ms = started.elapsed().as_millis(),
            "provider connected"
        );
        Ok(id)
    }

    fn reserve(&self, provider_id: &ProviderId) -> Result<Reservation<'_>, ConnectionError> {
        let mut table = self.table();
        if let Some(slot) = table.slots.get(provider_id) {
            return Err(ConnectionError::new(
                provider_id.clone(),
                ConnectionFailure::DuplicateProvider,
                format!("provider is already {}", slot.state()),
            ));
        }
        table
            .slots
            .insert(provider_id.clone(), ProviderSlot::Connecting);
        Ok(Reservation {
            table: &self.table,
            provider_id: provider_id.clone(),
            committed: false,
        })
    }

    /// Disconnects one provider.
    ///
    /// The provider's registry entries and connection record are removed
    /// before its binding is closed. Unknown providers and providers still
    /// `Connecting` or already `Disconnecting` are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`DisconnectError`] when the binding failed to close or did
    /// not close within the close deadline. State cleanup has happened
    /// regardless.
    pub async fn disconnect(&self, provider_id: &ProviderId) -> Result<(), DisconnectError> {
        match self.detach(provider_id) {
            Some(live) => self.close_detached(provider_id.clone(), live).await,
            None => {
                tracing::debug!(%provider_id, "disconnect ignored: provider not connected");
                Ok(())
            }
        }
    }

    /// Disconnects every provider, bounded by the teardown deadline.
    ///
    /// All providers leave the registry before any binding is closed, so a
    /// snapshot taken after this returns is empty of them even when a close
    /// hangs. Close failures are logged and reported, never raised.
    pub async fn disconnect_all(&self) -> TeardownReport {
        let detached: Vec<(ProviderId, LiveConnection)> = {
            let mut table = self.table();
            let mut connected: Vec<ProviderId> = table
                .slots
                .iter()
                .filter(|(_, slot)| matches!(slot, ProviderSlot::Connected(_)))
                .map(|(id, _)| id.clone())
                .collect();
            connected.sort_by_key(|id| match table.slots.get(id) {
                Some(ProviderSlot::Connected(live)) => live.sequence,
                _ => u64::MAX,
            });
            connected
                .into_iter()
                .filter_map(|id| {
                    Self::detach_locked(&mut table, &self.registry, &id).map(|live| (id, live))
                })
                .collect()
        };

        let mut report = TeardownReport::default();
        if detached.is_empty() {
            return report;
        }
        tracing::info!(providers = detached.len(), "tearing down provider connections");

        let mut pending: Vec<ProviderId> = detached.iter().map(|(id, _)| id.clone()).collect();
        let mut closing: FuturesUnordered<_> = detached
            .into_iter()
            .map(|(id, live)| async move {
                let outcome = self.close_detached(id.clone(), live).await;
                (id, outcome)
            })
            .collect();

        let deadline = tokio::time::Instant::now() + self.settings.teardown_timeout;
        loop {
            match tokio::time::timeout_at(deadline, closing.next()).await {
                Ok(Some((id, outcome))) => {
                    pending.retain(|candidate| candidate != &id);
                    match outcome {
                        Ok(()) => report.closed.push(id),
                        Err(err) => report.failed.push(TeardownFailure {
                            provider_id: id,
                            reason: err.reason(),
                            detail: err.to_string(),
                        }),
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        abandoned = pending.len(),
                        teardown_ms = self.settings.teardown_timeout.as_millis(),
                        "teardown deadline expired"
                    );
                    report.deadline_expired = true;
                    report.abandoned = pending;
                    break;
                }
            }
        }
        report
    }

    /// Returns the lifecycle state of one provider.
    #[must_use]
    pub fn state(&self, provider_id: &ProviderId) -> ProviderConnectionState {
        self.table()
            .slots
            .get(provider_id)
            .map_or(ProviderConnectionState::Unconnected, ProviderSlot::state)
    }

    /// Returns whether a provider is connected.
    #[must_use]
    pub fn is_connected(&self, provider_id: &ProviderId) -> bool {
        self.state(provider_id) == ProviderConnectionState::Connected
    }

    /// Returns connection records in connection order.
    #[must_use]
    pub fn connections(&self) -> Vec<ConnectionRecord> {
        let table = self.table();
        let mut live: Vec<&LiveConnection> = table
            .slots
            .values()
            .filter_map(|slot| match slot {
                ProviderSlot::Connected(connection) => Some(connection),
                ProviderSlot::Connecting | ProviderSlot::Disconnecting => None,
            })
            .collect();
        live.sort_by_key(|connection| connection.sequence);
        live.into_iter()
            .map(|connection| connection.record.clone())
            .collect()
    }

    fn detach(&self, provider_id: &ProviderId) -> Option<LiveConnection> {
        let mut table = self.table();
        Self::detach_locked(&mut table, &self.registry, provider_id)
    }

    fn detach_locked(
        table: &mut ConnectionTable,
        registry: &CapabilityRegistry,
        provider_id: &ProviderId,
    ) -> Option<LiveConnection> {
        match table.slots.remove(provider_id) {
            Some(ProviderSlot::Connected(live)) => {
                table
                    .slots
                    .insert(provider_id.clone(), ProviderSlot::Disconnecting);
                registry.remove_provider(provider_id);
                Some(live)
            }
            Some(other) => {
                table.slots.insert(provider_id.clone(), other);
                None
            }
            None => None,
        }
    }

    async fn close_detached(
        &self,
        provider_id: ProviderId,
        mut live: LiveConnection,
    ) -> Result<(), DisconnectError> {
        let _release = Release {
            table: &self.table,
            provider_id: provider_id.clone(),
        };
        let started = Instant::now();
        let timeout = self.settings.close_timeout;

        match tokio::time::timeout(timeout, live.binding.close()).await {
            Ok(Ok(())) => {
                tracing::info!(
                    %provider_id,
                    kind = %live.record.kind(),
                    elapsed_ms = started.elapsed().as_millis(),
                    "provider disconnected"
                );
                Ok(())
            }
            Ok(Err(err)) => {
                tracing::warn!(%provider_id, error = %err, "provider binding failed to close");
                Err(DisconnectError::CloseFailed {
                    provider_id,
                    detail: err.to_string(),
                })
            }
            Err(_) => {
                tracing::warn!(
                    %provider_id,
                    close_ms = timeout.as_millis(),
                    "provider binding did not close in time"
                );
                Err(DisconnectError::CloseTimedOut {
                    provider_id,
                    timeout_ms: timeout.as_millis(),
                })
            }
        }
    }
}

/// Holds a `Connecting` slot; dropping it uncommitted frees the id again.
struct Reservation<'a> {
    table: &'a Mutex<ConnectionTable>,
    provider_id: ProviderId,
    committed: bool,
}

impl Reservation<'_> {
    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(
            table.slots.get(&self.provider_id),
            Some(ProviderSlot::Connecting)
        ) {
            table.slots.remove(&self.provider_id);
        }
    }
}

/// Frees a `Disconnecting` slot once its close finished or was abandoned.
struct Release<'a> {
    table: &'a Mutex<ConnectionTable>,
    provider_id: ProviderId,
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(
            table.slots.get(&self.provider_id),
            Some(ProviderSlot::Disconnecting)
        ) {
            table.slots.remove(&self.provider_id);
        }
    }
}
