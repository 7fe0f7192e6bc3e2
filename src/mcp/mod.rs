//! MCP server: JSON-RPC 2.0 dispatch over a transport-agnostic message interface.
//!
//! Transports ([`stdio`], [`sse`]) hand raw messages to [`McpServer`] and write back
//! whatever it returns. Requests carrying an `id` get exactly one response, notifications
//! get none, and arrays are handled as batches.

use crate::tools::{ToolContext, ToolRegistry};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

pub mod protocol;
pub mod sse;
pub mod stdio;


pub use protocol::{RpcError, PROTOCOL_VERSION, SERVER_NAME};

/// Protocol dispatcher shared by every transport.
#[derive(Clone)]
pub struct McpServer {
    registry: Arc<ToolRegistry>,
    ctx: ToolContext,
}

impl McpServer {
    pub fn new(registry: Arc<ToolRegistry>, ctx: ToolContext) -> Self {
        Self { registry, ctx }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Handles one line of raw input.
    ///
    /// # Returns
    /// * `Some(String)` - Serialized response (or batch response) to send back
    /// * `None` - Nothing to send (notification, or a batch made only of notifications)
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let response = match serde_json::from_str::<Value>(line) {
            Ok(message) => self.handle_message(message).await?,
            Err(e) => {
                warn!(error = %e, "Received unparsable JSON-RPC message");
                protocol::error_response(Value::Null, RpcError::parse_error(format!("Parse error: {}", e)))
            }
        };
        Some(response.to_string())
    }

    /// Handles a decoded message: a single request/notification or a batch.
    pub async fn handle_message(&self, message: Value) -> Option<Value> {
        match message {
            Value::Array(items) => {
                if items.is_empty() {
                    return Some(protocol::error_response(
                        Value::Null,
                        RpcError::invalid_request("Batch request must not be empty"),
                    ));
                }
                let mut responses = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(response) = self.handle_single(item).await {
                        responses.push(response);
                    }
                }
                if responses.is_empty() {
                    None
                } else {
                    Some(Value::Array(responses))
                }
            }
            other => self.handle_single(other).await,
        }
    }

    async fn handle_single(&self, message: Value) -> Option<Value> {
        let Value::Object(message) = message else {
            return Some(protocol::error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        let id = message.get("id").cloned();
        if message.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            return Some(protocol::error_response(
                id.unwrap_or(Value::Null),
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        // Responses to server-initiated requests carry no method; there are none to match.
        let method = message.get("method").and_then(Value::as_str)?;
        let params = message.get("params").cloned();

        let Some(id) = id else {
            debug!(method = %method, "Received notification");
            return None;
        };

        debug!(method = %method, "Handling request");
        Some(match self.handle_request(method, params).await {
            Ok(result) => protocol::success_response(id, result),
            Err(e) => {
                debug!(method = %method, error = %e, "Request failed");
                protocol::error_response(id, e)
            }
        })
    }

    async fn handle_request(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {"listChanged": false},
                    "resources": {"listChanged": false},
                    "prompts": {"listChanged": false}
                },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION")
                }
            })),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({"tools": self.registry.list()})),
            "tools/call" => self.call_tool(params).await,
            "resources/list" => Ok(json!({"resources": []})),
            "prompts/list" => Ok(json!({"prompts": []})),
            other => Err(RpcError::method_not_found(other)),
        }
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, RpcError> {
        let params: Map<String, Value> = match params {
            Some(Value::Object(map)) => map,
            _ => return Err(RpcError::invalid_params("tools/call params must be an object")),
        };
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return Err(RpcError::invalid_params("tools/call requires a string 'name'"));
        };
        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(Value::Object(map.clone())),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ))
            }
        };

        let Some(result) = self.registry.call(&self.ctx, name, arguments).await else {
            return Err(RpcError::invalid_params(format!("Unknown tool: {}", name)));
        };
        serde_json::to_value(result).map_err(|e| RpcError::internal(e.to_string()))
    }
}
