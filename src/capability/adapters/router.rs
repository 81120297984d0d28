//! Connector that dispatches on the target's transport kind.

use super::{PipedConnector, StreamedConnector, TransportSettings};
use crate::capability::{
    domain::{ConnectionError, ProviderId, ProviderTarget},
    ports::{OpenedBinding, TransportConnector},
};
use async_trait::async_trait;

/// Production connector covering both transport kinds.
#[derive(Debug, Clone)]
pub struct TransportRouter {
    piped: PipedConnector,
    streamed: StreamedConnector,
}

impl TransportRouter {
    /// Creates a router sharing one set of deadlines.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] when the HTTP client cannot be initialized.
    pub fn new(settings: TransportSettings) -> Result<Self, reqwest::Error> {
        Ok(Self {
            piped: PipedConnector::new(settings),
            streamed: StreamedConnector::new(settings)?,
        })
    }
}

#[async_trait]
impl TransportConnector for TransportRouter {
    async fn open(
        &self,
        provider_id: &ProviderId,
        target: &ProviderTarget,
    ) -> Result<OpenedBinding, ConnectionError> {
        match target {
            ProviderTarget::Piped(_) => self.piped.open(provider_id, target).await,
            ProviderTarget::Streamed(_) => self.streamed.open(provider_id, target).await,
        }
    }
}
