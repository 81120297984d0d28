//! Discovery handshake: initialize, acknowledge, then page through tools.

use super::protocol::{self, ProtocolError};
use super::session::{RpcCallError, RpcSession};
use crate::capability::domain::{
    CapabilityDefinition, CapabilityDescriptor, ConnectionError, ConnectionFailure, ProviderId,
};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on `tools/list` pages, guarding against cursor loops.
const MAX_LIST_PAGES: usize = 64;

/// Runs the discovery handshake and publishes one descriptor per capability.
///
/// The whole exchange is bounded by `timeout`; expiry maps to
/// `handshake_timeout`, error replies and malformed pages to
/// `handshake_rejected`.
pub(crate) async fn discover(
    provider_id: &ProviderId,
    session: &Arc<RpcSession>,
    timeout: Duration,
) -> Result<Vec<CapabilityDescriptor>, ConnectionError> {
    let definitions = tokio::time::timeout(timeout, exchange(session, timeout))
        .await
        .map_err(|_| {
            ConnectionError::new(
                provider_id.clone(),
                ConnectionFailure::HandshakeTimeout,
                format!("no discovery response within {}ms", timeout.as_millis()),
            )
        })?
        .map_err(|err| handshake_error(provider_id, err))?;

    let invoker: Arc<RpcSession> = Arc::clone(session);
    definitions
        .into_iter()
        .map(|definition| {
            CapabilityDescriptor::new(provider_id.clone(), definition, invoker.clone()).map_err(
                |err| {
                    ConnectionError::new(
                        provider_id.clone(),
                        ConnectionFailure::HandshakeRejected,
                        err.to_string(),
                    )
                },
            )
        })
        .collect()
}

enum ExchangeError {
    Call(RpcCallError),
    Protocol(ProtocolError),
}

async fn exchange(
    session: &RpcSession,
    timeout: Duration,
) -> Result<Vec<CapabilityDefinition>, ExchangeError> {
    session
        .request("initialize", Some(protocol::initialize_params()), timeout)
        .await
        .map_err(ExchangeError::Call)?;
    session
        .notify("notifications/initialized", None)
        .map_err(ExchangeError::Call)?;

    let mut definitions = Vec::new();
    let mut cursor: Option<String> = None;
    for _ in 0..MAX_LIST_PAGES {
        let page = session
            .request("tools/list", protocol::list_params(cursor.as_deref()), timeout)
            .await
            .map_err(ExchangeError::Call)?;
        let (mut batch, next) = protocol::parse_tool_page(page).map_err(ExchangeError::Protocol)?;
        definitions.append(&mut batch);
        match next {
            Some(value) => cursor = Some(value),
            None => return Ok(definitions),
        }
    }

    Err(ExchangeError::Protocol(ProtocolError(format!(
        "tool listing did not terminate after {MAX_LIST_PAGES} pages"
    ))))
}

fn handshake_error(provider_id: &ProviderId, err: ExchangeError) -> ConnectionError {
    let (reason, detail) = match err {
        ExchangeError::Call(RpcCallError::TimedOut { method, timeout_ms }) => (
            ConnectionFailure::HandshakeTimeout,
            format!("{method} did not answer within {timeout_ms}ms"),
        ),
        ExchangeError::Call(RpcCallError::Closed) => (
            ConnectionFailure::HandshakeRejected,
            "provider closed the channel during discovery".to_owned(),
        ),
        ExchangeError::Call(RpcCallError::Undelivered(detail)) => {
            (ConnectionFailure::UnreachableTarget, detail)
        }
        ExchangeError::Call(other) => (ConnectionFailure::HandshakeRejected, other.to_string()),
        ExchangeError::Protocol(protocol_error) => (
            ConnectionFailure::HandshakeRejected,
            protocol_error.to_string(),
        ),
    };
    ConnectionError::new(provider_id.clone(), reason, detail)
}
