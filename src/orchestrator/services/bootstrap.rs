//! One-time, best-effort connection of configured providers.

use crate::capability::{
    ports::TransportConnector,
    services::ProviderConnectionManager,
};
use crate::orchestrator::domain::{BootstrapFailure, BootstrapReport, ProviderEntry};
use mockable::Clock;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Connects `entries` in order, logging and skipping the ones that fail.
pub async fn connect_all<C, K>(
    manager: &ProviderConnectionManager<C, K>,
    entries: &[ProviderEntry],
) -> BootstrapReport
where
    C: TransportConnector,
    K: Clock + Send + Sync,
{
    let mut report = BootstrapReport::default();
    for entry in entries {
        match manager
            .connect(entry.provider_id.clone(), entry.target.clone())
            .await
        {
            Ok(provider_id) => report.connected.push(provider_id),
            Err(err) => {
                tracing::error!(
                    index = entry.index,
                    provider_id = %err.provider_id(),
                    target = %entry.target.describe(),
                    reason = %err.reason(),
                    detail = err.detail(),
                    "bootstrap connection failed"
                );
                report.failed.push(BootstrapFailure {
                    index: entry.index,
                    provider_id: err.provider_id().clone(),
                    reason: err.reason(),
                    detail: err.detail().to_owned(),
                });
            }
        }
    }
    tracing::info!(
        connected = report.connected.len(),
        failed = report.failed.len(),
        "provider bootstrap finished"
    );
    report
}

/// Runs the provider bootstrap exactly once, however many paths ask for it.
pub struct ProviderBootstrap<C, K>
where
    C: TransportConnector,
    K: Clock + Send + Sync,
{
    manager: Arc<ProviderConnectionManager<C, K>>,
    entries: Vec<ProviderEntry>,
    report: OnceCell<BootstrapReport>,
}

impl<C, K> ProviderBootstrap<C, K>
where
    C: TransportConnector,
    K: Clock + Send + Sync,
{
    /// Creates a bootstrap for `entries`.
    #[must_use]
    pub fn new(
        manager: Arc<ProviderConnectionManager<C, K>>,
        entries: Vec<ProviderEntry>,
    ) -> Self {
        Self {
            manager,
            entries,
            report: OnceCell::new(),
        }
    }

    /// Runs the bootstrap unless it already ran and returns its report.
    ///
    /// Concurrent callers wait for the first one; nobody connects twice.
    pub async fn ensure(&self) -> &BootstrapReport {
        self.report
            .get_or_init(|| connect_all(&self.manager, &self.entries))
            .await
    }

    /// Returns whether the bootstrap has completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.report.initialized()
    }

    /// Returns the report once the bootstrap has completed.
    #[must_use]
    pub fn report(&self) -> Option<&BootstrapReport> {
        self.report.get()
    }

    /// Returns the configured entries.
    #[must_use]
    pub fn entries(&self) -> &[ProviderEntry] {
        &self.entries
    }
}
