//! JSON-RPC 2.0 frames and tool-protocol payload parsing.

use crate::capability::domain::{CapabilityDefinition, CapabilityOutput, InvocationError};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// Protocol revision announced during `initialize`.
pub(crate) const PROTOCOL_VERSION: &str = "2024-11-05";

const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC error code for invalid method parameters.
pub(crate) const INVALID_PARAMS: i64 = -32602;

/// JSON-RPC error code for unknown methods.
pub(crate) const METHOD_NOT_FOUND: i64 = -32601;

/// Outgoing request frame.
#[derive(Debug, Serialize)]
pub(crate) struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl<'a> RpcRequest<'a> {
    pub(crate) const fn new(id: u64, method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }
}

/// Outgoing notification frame.
#[derive(Debug, Serialize)]
pub(crate) struct RpcNotification<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl<'a> RpcNotification<'a> {
    pub(crate) const fn new(method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
        }
    }
}

/// Outgoing reply to a provider-initiated request.
#[derive(Debug, Serialize)]
pub(crate) struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcErrorObject>,
}

impl RpcResponse {
    pub(crate) const fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub(crate) const fn failure(id: Value, error: RpcErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct RpcErrorObject {
    pub(crate) code: i64,
    pub(crate) message: String,
}

#[derive(Debug, Deserialize)]
struct RawIncoming {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// Incoming frame after classification.
#[derive(Debug, PartialEq)]
pub(crate) enum Incoming {
    /// Reply to one of our requests.
    Reply {
        id: u64,
        outcome: Result<Value, RpcErrorObject>,
    },
    /// Request initiated by the provider.
    Request { id: Value, method: String },
    /// Notification initiated by the provider.
    Notification { method: String },
}

/// Error raised for frames or payloads that do not follow the protocol.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("protocol violation: {0}")]
pub(crate) struct ProtocolError(pub(crate) String);

/// Classifies one raw frame.
pub(crate) fn classify(frame: &str) -> Result<Incoming, ProtocolError> {
    let raw: RawIncoming =
        serde_json::from_str(frame).map_err(|err| ProtocolError(err.to_string()))?;

    match (raw.id, raw.method) {
        (Some(id), Some(method)) => Ok(Incoming::Request { id, method }),
        (None, Some(method)) => Ok(Incoming::Notification { method }),
        (Some(id), None) => {
            let numeric_id = id
                .as_u64()
                .ok_or_else(|| ProtocolError(format!("reply id {id} is not numeric")))?;
            let outcome = match raw.error {
                Some(error) => Err(error),
                None => Ok(raw.result.unwrap_or(Value::Null)),
            };
            Ok(Incoming::Reply {
                id: numeric_id,
                outcome,
            })
        }
        (None, None) => Err(ProtocolError(
            "frame carries neither an id nor a method".to_owned(),
        )),
    }
}

/// Builds `initialize` parameters.
pub(crate) fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

/// Builds `tools/list` parameters for an optional pagination cursor.
pub(crate) fn list_params(cursor: Option<&str>) -> Option<Value> {
    cursor.map(|value| json!({ "cursor": value }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolPage {
    #[serde(default)]
    tools: Vec<ToolEntry>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolEntry {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    input_schema: Option<Value>,
}

/// Parses one `tools/list` result page.
pub(crate) fn parse_tool_page(
    result: Value,
) -> Result<(Vec<CapabilityDefinition>, Option<String>), ProtocolError> {
    let page: ToolPage =
        serde_json::from_value(result).map_err(|err| ProtocolError(err.to_string()))?;
    let definitions = page
        .tools
        .into_iter()
        .map(|tool| {
            CapabilityDefinition::new(
                tool.name,
                tool.description.unwrap_or_default(),
                tool.input_schema
                    .unwrap_or_else(|| json!({"type": "object"})),
            )
            .map_err(|err| ProtocolError(err.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let cursor = page.next_cursor.filter(|value| !value.is_empty());
    Ok((definitions, cursor))
}

/// Parses a `tools/call` result into an output or a remote fault.
pub(crate) fn parse_call_result(result: Value) -> Result<CapabilityOutput, InvocationError> {
    let is_error = result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let content = result.get("content").cloned().unwrap_or(Value::Null);
    let text = render_content(&content);

    if is_error {
        return Err(InvocationError::remote_fault(text));
    }
    Ok(CapabilityOutput::new(text, content))
}

fn render_content(content: &Value) -> String {
    let Some(blocks) = content.as_array() else {
        return match content {
            Value::Null => String::new(),
            other => other.to_string(),
        };
    };

    blocks
        .iter()
        .map(|block| match block.get("text").and_then(Value::as_str) {
            Some(text) => text.to_owned(),
            None => block.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
