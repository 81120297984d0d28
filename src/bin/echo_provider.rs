//! Minimal piped tool provider speaking newline-delimited JSON-RPC on stdio.
//!
//! Usage:
//!
//! ```text
//! echo_provider [--silent] [--ignore-term] [--page-size <n>] [TOOLS...]
//! ```
//!
//! Every tool named on the command line (default: `echo`) is listed through
//! paginated `tools/list` replies. Calls echo the tool name and its JSON
//! arguments back as one text block, except for two reserved names:
//!
//! - `sleep` waits for `arguments.ms` milliseconds before answering.
//! - `fail` answers with a tool-level error result.
//!
//! `--silent` never answers `initialize`, which lets callers exercise
//! handshake deadlines. `--ignore-term` keeps the process alive after end of
//! input and SIGTERM, which lets callers exercise forced termination.

use clap::Parser;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};

const PROTOCOL_VERSION: &str = "2024-11-05";
const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Parser)]
#[command(name = "echo_provider", about = "Echoing tool provider for stdio transports")]
struct Args {
    /// Never answer `initialize`.
    #[arg(long)]
    silent: bool,

    /// Keep running after end of input and SIGTERM.
    #[arg(long)]
    ignore_term: bool,

    /// Tools per `tools/list` page.
    #[arg(long, default_value_t = 2)]
    page_size: usize,

    /// Tool names to expose.
    #[arg(default_value = "echo")]
    tools: Vec<String>,
}

#[derive(Debug, Error)]
enum ProviderError {
    #[error("failed to read stdin: {0}")]
    Input(#[from] LinesCodecError),
    #[error("failed to install signal handler: {0}")]
    Signal(#[source] io::Error),
    #[error("reply writer stopped: {0}")]
    Writer(#[from] JoinError),
}

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

type Replies = mpsc::UnboundedSender<Value>;

#[derive(Debug)]
struct Toolbox {
    names: Vec<String>,
    page_size: usize,
}

impl Toolbox {
    fn new(names: Vec<String>, page_size: usize) -> Self {
        Self {
            names,
            page_size: page_size.max(1),
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|known| known == name)
    }

    fn page(&self, params: &Value) -> Value {
        let start = params
            .get("cursor")
            .and_then(Value::as_str)
            .and_then(|cursor| cursor.parse::<usize>().ok())
            .unwrap_or(0);
        let tools: Vec<Value> = self
            .names
            .iter()
            .skip(start)
            .take(self.page_size)
            .map(|name| {
                json!({
                    "name": name,
                    "description": format!("Echoes calls to {name}"),
                    "inputSchema": {"type": "object"},
                })
            })
            .collect();
        let next = start.saturating_add(self.page_size);
        if next < self.names.len() {
            json!({ "tools": tools, "nextCursor": next.to_string() })
        } else {
            json!({ "tools": tools })
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    match serve(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let _reported = writeln!(io::stderr(), "echo_provider: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn serve(args: Args) -> Result<(), ProviderError> {
    if args.ignore_term {
        ignore_termination()?;
    }
    let toolbox = Arc::new(Toolbox::new(args.tools, args.page_size));
    let (replies, queued) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_replies(queued));
    let _announced = writeln!(
        io::stderr(),
        "echo_provider ready: {}",
        toolbox.names.join(",")
    );

    let mut lines = FramedRead::new(tokio::io::stdin(), LinesCodec::new());
    while let Some(line) = lines.next().await {
        let frame = line?;
        if frame.trim().is_empty() {
            continue;
        }
        handle(args.silent, &toolbox, &replies, &frame);
    }

    if args.ignore_term {
        std::future::pending::<()>().await;
    }
    drop(replies);
    writer.await?;
    Ok(())
}

fn handle(silent: bool, toolbox: &Arc<Toolbox>, replies: &Replies, frame: &str) {
    let request: Request = match serde_json::from_str(frame) {
        Ok(request) => request,
        Err(err) => {
            send(replies, failure(Value::Null, PARSE_ERROR, &err.to_string()));
            return;
        }
    };
    // Notifications, including `notifications/initialized`, need no reply.
    let Some(id) = request.id else {
        return;
    };

    match request.method.as_str() {
        "initialize" if silent => {}
        "initialize" => send(
            replies,
            success(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {
                        "name": "echo_provider",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            ),
        ),
        "ping" => send(replies, success(id, json!({}))),
        "tools/list" => send(replies, success(id, toolbox.page(&request.params))),
        "tools/call" => {
            let toolbox = Arc::clone(toolbox);
            let replies = replies.clone();
            tokio::spawn(async move {
                let reply = call(&toolbox, id, &request.params).await;
                send(&replies, reply);
            });
        }
        other => send(
            replies,
            failure(id, METHOD_NOT_FOUND, &format!("unknown method {other}")),
        ),
    }
}

async fn call(toolbox: &Toolbox, id: Value, params: &Value) -> Value {
    let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
    if !toolbox.contains(name) {
        return failure(id, INVALID_PARAMS, &format!("unknown tool {name}"));
    }
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

    match name {
        "sleep" => {
            let millis = arguments.get("ms").and_then(Value::as_u64).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(millis)).await;
            success(id, text_result(&format!("slept {millis}ms"), false))
        }
        "fail" => success(id, text_result("fail requested", true)),
        _ => success(id, text_result(&format!("{name} {arguments}"), false)),
    }
}

fn text_result(text: &str, is_error: bool) -> Value {
    json!({
        "content": [{"type": "text", "text": text}],
        "isError": is_error,
    })
}

fn success(id: Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn failure(id: Value, code: i64, message: &str) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
}

fn send(replies: &Replies, reply: Value) {
    // The writer only goes away once stdout is gone; nothing is left to tell.
    let _undeliverable = replies.send(reply);
}

async fn write_replies(mut queued: mpsc::UnboundedReceiver<Value>) {
    let mut sink = FramedWrite::new(tokio::io::stdout(), LinesCodec::new());
    while let Some(reply) = queued.recv().await {
        if sink.send(reply.to_string()).await.is_err() {
            return;
        }
    }
}

#[cfg(unix)]
fn ignore_termination() -> Result<(), ProviderError> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminations = signal(SignalKind::terminate()).map_err(ProviderError::Signal)?;
    tokio::spawn(async move { while terminations.recv().await.is_some() {} });
    Ok(())
}

#[cfg(not(unix))]
const fn ignore_termination() -> Result<(), ProviderError> {
    Ok(())
}
