//! Process-teardown hook.

use crate::capability::{
    ports::TransportConnector,
    services::{ProviderConnectionManager, TeardownReport},
};
use mockable::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Disconnects every provider, at most once.
pub struct ShutdownHook<C, K>
where
    C: TransportConnector,
    K: Clock + Send + Sync,
{
    manager: Arc<ProviderConnectionManager<C, K>>,
    fired: AtomicBool,
}

impl<C, K> ShutdownHook<C, K>
where
    C: TransportConnector,
    K: Clock + Send + Sync,
{
    /// Creates a hook for `manager`.
    #[must_use]
    pub const fn new(manager: Arc<ProviderConnectionManager<C, K>>) -> Self {
        Self {
            manager,
            fired: AtomicBool::new(false),
        }
    }

    /// Runs `disconnect_all` the first time it is called.
    ///
    /// Later calls return `None`. With nothing connected, including when
    /// bootstrap never ran, the teardown is an empty no-op.
    pub async fn fire(&self) -> Option<TeardownReport> {
        if self.fired.swap(true, Ordering::SeqCst) {
            tracing::debug!("shutdown hook already ran");
            return None;
        }
        let report = self.manager.disconnect_all().await;
        if report.is_clean() {
            tracing::info!(closed = report.closed.len(), "shutdown complete");
        } else {
            tracing::warn!(
                closed = report.closed.len(),
                failed = report.failed.len(),
                abandoned = report.abandoned.len(),
                "shutdown finished with teardown failures"
            );
        }
        Some(report)
    }

    /// Returns whether the hook has fired.
    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}
