//! In-process tool provider served over HTTP with server-sent events.
//!
//! `GET /sse` opens the event stream and announces `/messages` as the
//! endpoint; every frame posted there is answered with a `message` event.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::sse::{Event, Sse},
    routing::{get, post},
};
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{Value, json};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_util::task::AbortOnDropHandle;

/// How the provider treats new event streams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamBehaviour {
    /// Announce the endpoint and answer requests.
    #[default]
    Serve,
    /// Answer the stream request with `503 Service Unavailable`.
    Refuse,
    /// Keep the stream open without ever announcing an endpoint.
    WithholdEndpoint,
}

type EventSender = mpsc::UnboundedSender<Event>;
type EventBody = BoxStream<'static, Result<Event, Infallible>>;

struct ProviderState {
    tools: Vec<String>,
    behaviour: StreamBehaviour,
    stream: Mutex<Option<EventSender>>,
}

impl ProviderState {
    fn stream(&self) -> MutexGuard<'_, Option<EventSender>> {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, frame: &Value) {
        if let Some(sender) = self.stream().as_ref() {
            let _closed = sender.send(Event::default().event("message").data(frame.to_string()));
        }
    }
}

/// Running provider; the server stops when this is dropped.
pub struct SseProvider {
    address: SocketAddr,
    state: Arc<ProviderState>,
    _server: AbortOnDropHandle<()>,
}

impl SseProvider {
    /// Starts a provider on an ephemeral local port.
    pub async fn start(tools: &[&str], behaviour: StreamBehaviour) -> eyre::Result<Self> {
        let state = Arc::new(ProviderState {
            tools: tools.iter().map(|tool| (*tool).to_owned()).collect(),
            behaviour,
            stream: Mutex::new(None),
        });
        let router = Router::new()
            .route("/sse", get(open_stream))
            .route("/messages", post(receive))
            .with_state(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;
        let server = tokio::spawn(async move {
            let _stopped = axum::serve(listener, router).await;
        });
        Ok(Self {
            address,
            state,
            _server: AbortOnDropHandle::new(server),
        })
    }

    /// Returns the URL of the event stream.
    pub fn url(&self) -> String {
        format!("http://{}/sse", self.address)
    }

    /// Ends the current event stream, as a provider going away would.
    pub fn end_stream(&self) {
        self.state.stream().take();
    }
}

async fn open_stream(State(state): State<Arc<ProviderState>>) -> Result<Sse<EventBody>, StatusCode> {
    if state.behaviour == StreamBehaviour::Refuse {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    let (sender, receiver) = mpsc::unbounded_channel();
    if state.behaviour == StreamBehaviour::Serve {
        let _closed = sender.send(Event::default().event("endpoint").data("/messages"));
    }
    *state.stream() = Some(sender);

    let events = stream::unfold(receiver, |mut receiver| async move {
        receiver
            .recv()
            .await
            .map(|event| (Ok::<_, Infallible>(event), receiver))
    });
    Ok(Sse::new(events.boxed()))
}

async fn receive(State(state): State<Arc<ProviderState>>, Json(frame): Json<Value>) -> StatusCode {
    let Some(id) = frame.get("id").cloned() else {
        return StatusCode::ACCEPTED;
    };
    let params = frame.get("params").cloned().unwrap_or(Value::Null);
    let reply = match frame.get("method").and_then(Value::as_str).unwrap_or_default() {
        "initialize" => Some(success(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "sse-provider", "version": "0.0.0"},
            }),
        )),
        "tools/list" => {
            let tools: Vec<Value> = state
                .tools
                .iter()
                .map(|name| json!({"name": name, "description": format!("Streams {name}")}))
                .collect();
            Some(success(id, json!({ "tools": tools })))
        }
        "tools/call" => call(&state, id, &params),
        other => Some(failure(id, -32601, &format!("unknown method {other}"))),
    };
    if let Some(reply) = reply {
        state.push(&reply);
    }
    StatusCode::ACCEPTED
}

/// `hang` never answers; every other known tool echoes its arguments.
fn call(state: &ProviderState, id: Value, params: &Value) -> Option<Value> {
    let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
    if !state.tools.iter().any(|tool| tool == name) {
        return Some(failure(id, -32602, &format!("unknown tool {name}")));
    }
    if name == "hang" {
        return None;
    }
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
    Some(success(
        id,
        json!({"content": [{"type": "text", "text": format!("{name} {arguments}")}]}),
    ))
}

fn success(id: Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn failure(id: Value, code: i64, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}
