//! Event-stream transport: replies arrive over SSE, requests go out as POSTs.
//!
//! The provider announces its message endpoint in an `endpoint` event; every
//! later `message` event carries one JSON-RPC frame.

use super::TransportSettings;
use super::rpc::{self, FrameSender, OutboundFrame, PendingCalls, RpcSession};
use crate::capability::{
    domain::{ConnectionError, ConnectionFailure, ProviderId, ProviderTarget, TransportKind},
    ports::{OpenedBinding, TransportBinding, TransportCloseResult, TransportConnector},
};
use async_trait::async_trait;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Url};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::task::AbortOnDropHandle;

type EventStream =
    Pin<Box<dyn Stream<Item = Result<Event, EventStreamError<reqwest::Error>>> + Send>>;

/// Opens streamed provider bindings.
#[derive(Debug, Clone)]
pub struct StreamedConnector {
    client: Client,
    settings: TransportSettings,
}

impl StreamedConnector {
    /// Creates a connector with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] when the HTTP client cannot be initialized.
    pub fn new(settings: TransportSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(settings.handshake_timeout)
            .build()?;
        Ok(Self { client, settings })
    }

    async fn open_stream(
        &self,
        provider_id: &ProviderId,
        url: &Url,
    ) -> Result<EventStream, ConnectionError> {
        let unreachable = |detail: String| {
            ConnectionError::new(provider_id.clone(), ConnectionFailure::UnreachableTarget, detail)
        };

        let response = tokio::time::timeout(
            self.settings.handshake_timeout,
            self.client
                .get(url.clone())
                .header(ACCEPT, "text/event-stream")
                .send(),
        )
        .await
        .map_err(|_| unreachable(format!("{url} did not respond")))?
        .map_err(|err| unreachable(format!("{url}: {err}")))?
        .error_for_status()
        .map_err(|err| unreachable(format!("{url}: {err}")))?;

        Ok(Box::pin(response.bytes_stream().eventsource()))
    }

    async fn await_endpoint(
        &self,
        provider_id: &ProviderId,
        base: &Url,
        events: &mut EventStream,
    ) -> Result<Url, ConnectionError> {
        let announced = tokio::time::timeout(self.settings.handshake_timeout, async {
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) if event.event == "endpoint" => return Ok(event.data),
                    Ok(_) => {}
                    Err(err) => return Err(err.to_string()),
                }
            }
            Err("event stream ended before announcing an endpoint".to_owned())
        })
        .await
        .map_err(|_| {
            ConnectionError::new(
                provider_id.clone(),
                ConnectionFailure::HandshakeTimeout,
                format!(
                    "no endpoint announced within {}ms",
                    self.settings.handshake_timeout.as_millis()
                ),
            )
        })?
        .map_err(|detail| {
            ConnectionError::new(provider_id.clone(), ConnectionFailure::UnreachableTarget, detail)
        })?;

        base.join(announced.trim()).map_err(|err| {
            ConnectionError::new(
                provider_id.clone(),
                ConnectionFailure::HandshakeRejected,
                format!("invalid endpoint '{announced}': {err}"),
            )
        })
    }
}

#[async_trait]
impl TransportConnector for StreamedConnector {
    async fn open(
        &self,
        provider_id: &ProviderId,
        target: &ProviderTarget,
    ) -> Result<OpenedBinding, ConnectionError> {
        let ProviderTarget::Streamed(streamed) = target else {
            return Err(ConnectionError::new(
                provider_id.clone(),
                ConnectionFailure::UnreachableTarget,
                format!("streamed transport cannot reach {}", target.describe()),
            ));
        };
        let base = Url::parse(streamed.url()).map_err(|err| {
            ConnectionError::new(
                provider_id.clone(),
                ConnectionFailure::UnreachableTarget,
                format!("invalid url '{}': {err}", streamed.url()),
            )
        })?;

        let mut events = self.open_stream(provider_id, &base).await?;
        let endpoint = self.await_endpoint(provider_id, &base, &mut events).await?;
        tracing::debug!(%provider_id, %endpoint, "provider announced message endpoint");

        let (outbound, queued) = mpsc::unbounded_channel();
        let pending = Arc::new(PendingCalls::default());
        let session = Arc::new(RpcSession::new(
            provider_id.clone(),
            outbound.clone(),
            pending.clone(),
            self.settings.call_timeout,
        ));
        let writer = tokio::spawn(post_frames(
            provider_id.clone(),
            self.client.clone(),
            endpoint,
            queued,
            pending.clone(),
        ));
        let reader = tokio::spawn(read_events(provider_id.clone(), events, outbound, pending));
        let mut binding = StreamedBinding {
            session,
            writer: Some(AbortOnDropHandle::new(writer)),
            reader: Some(AbortOnDropHandle::new(reader)),
        };

        match rpc::discover(provider_id, &binding.session, self.settings.handshake_timeout).await
        {
            Ok(descriptors) => {
                tracing::info!(
                    %provider_id,
                    url = %base,
                    capabilities = descriptors.len(),
                    "streamed provider ready"
                );
                Ok(OpenedBinding {
                    binding: Box::new(binding),
                    descriptors,
                })
            }
            Err(err) => {
                if let Err(close_err) = binding.close().await {
                    tracing::warn!(%provider_id, error = %close_err, "cleanup after failed handshake");
                }
                Err(err)
            }
        }
    }
}

/// Live binding to a provider reached over an event stream.
pub struct StreamedBinding {
    session: Arc<RpcSession>,
    writer: Option<AbortOnDropHandle<()>>,
    reader: Option<AbortOnDropHandle<()>>,
}

#[async_trait]
impl TransportBinding for StreamedBinding {
    fn kind(&self) -> TransportKind {
        TransportKind::Streamed
    }

    async fn close(&mut self) -> TransportCloseResult {
        self.session.close();
        drop(self.writer.take());
        drop(self.reader.take());
        Ok(())
    }
}

async fn post_frames(
    provider_id: ProviderId,
    client: Client,
    endpoint: Url,
    mut queued: mpsc::UnboundedReceiver<OutboundFrame>,
    pending: Arc<PendingCalls>,
) {
    while let Some(frame) = queued.recv().await {
        let delivery = client
            .post(endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(frame.body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);
        if let Err(err) = delivery {
            tracing::warn!(%provider_id, error = %err, "failed to deliver frame");
            if let Some(id) = frame.request_id {
                pending.resolve(id, Err(rpc::session::RpcCallError::Undelivered(err.to_string())));
            }
        }
    }
}

async fn read_events(
    provider_id: ProviderId,
    mut events: EventStream,
    outbound: FrameSender,
    pending: Arc<PendingCalls>,
) {
    while let Some(event) = events.next().await {
        match event {
            Ok(event) if event.event == "message" || event.event.is_empty() => {
                rpc::dispatch_frame(&provider_id, &pending, &outbound, &event.data);
            }
            Ok(event) => {
                tracing::debug!(%provider_id, event = %event.event, "ignoring stream event");
            }
            Err(err) => {
                tracing::warn!(%provider_id, error = %err, "event stream failed");
                break;
            }
        }
    }
    rpc::channel_ended(&provider_id, &pending);
}
