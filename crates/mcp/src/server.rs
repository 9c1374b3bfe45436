// MCP server implementation: JSON-RPC method handling shared by every transport

use crate::dispatcher::{Dispatcher, Invocation};
use crate::protocol::{
    negotiate_version, CallToolParams, CallToolResult, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListToolsResult, ServerCapabilities,
    ServerInfo, ToolsCapability, JSONRPC_VERSION, LATEST_PROTOCOL_VERSION,
};
use crate::tools::ToolRegistry;
use anyhow::Result;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

pub const SERVER_NAME: &str = "dossier";

const INSTRUCTIONS: &str = "This server provides read access to a user directory. Use the \
search tool to find users by name, email or other details, then use the fetch tool to \
retrieve a complete profile with a citation URL.";

pub struct McpServer {
    dispatcher: Arc<Dispatcher>,
    server_info: ServerInfo,
}

impl McpServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        self.dispatcher.registry()
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Capability summary announced in handshakes
    pub fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: ToolsCapability {
                list_changed: false,
            },
        }
    }

    /// Parse and handle one raw JSON-RPC message
    pub async fn handle_message(&self, raw: &str) -> Option<JsonRpcResponse> {
        match serde_json::from_str::<JsonRpcRequest>(raw) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                tracing::warn!("Rejecting malformed JSON-RPC message: {}", e);
                Some(JsonRpcResponse::error(Value::Null, JsonRpcError::parse_error()))
            }
        }
    }

    /// Handle a JSON-RPC request. Notifications produce no response.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::error(
                request.id.unwrap_or(Value::Null),
                JsonRpcError::invalid_request(),
            ));
        }

        let Some(id) = request.id else {
            tracing::debug!("Received notification: {}", request.method);
            return None;
        };

        tracing::debug!(method = %request.method, id = %id, "Handling request");

        let outcome = match request.method.as_str() {
            "initialize" => self.initialize(request.params),
            "ping" => Ok(json!({})),
            "tools/list" => self.list_tools(),
            "tools/call" => self.call_tool(id.clone(), request.params).await,
            other => Err(JsonRpcError::method_not_found(other)),
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        })
    }

    fn initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let protocol_version = match params {
            Some(params) => {
                let params: InitializeParams = serde_json::from_value(params)
                    .map_err(|e| JsonRpcError::invalid_params(format!("Invalid initialize params: {}", e)))?;
                if let Some(client) = &params.client_info {
                    tracing::info!("Client connected: {} {}", client.name, client.version);
                }
                negotiate_version(&params.protocol_version)
            }
            None => LATEST_PROTOCOL_VERSION,
        };

        let result = InitializeResult {
            protocol_version: protocol_version.to_string(),
            capabilities: self.capabilities(),
            server_info: self.server_info.clone(),
            instructions: Some(INSTRUCTIONS.to_string()),
        };
        to_result(&result)
    }

    fn list_tools(&self) -> Result<Value, JsonRpcError> {
        to_result(&ListToolsResult {
            tools: self.registry().list(),
        })
    }

    async fn call_tool(&self, id: Value, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = params
            .ok_or_else(|| JsonRpcError::invalid_params("Missing tools/call params"))
            .and_then(|p| {
                serde_json::from_value(p)
                    .map_err(|e| JsonRpcError::invalid_params(format!("Invalid tools/call params: {}", e)))
            })?;

        tracing::info!("Tool call: {} (id {})", params.name, id);

        let invocation = Invocation::new(params.name, params.arguments, id);
        match self.dispatcher.dispatch(invocation).await {
            Ok(output) => to_result(&CallToolResult::structured(output)),
            Err(e) => {
                tracing::info!("Tool call failed: {} ({})", e, e.kind());
                Err(e.to_rpc_error())
            }
        }
    }

    /// Serve JSON-RPC over newline-delimited stdin/stdout until stdin closes
    pub async fn serve_stdio(&self) -> Result<()> {
        let mut input = FramedRead::new(tokio::io::stdin(), LinesCodec::new());
        let mut output = FramedWrite::new(tokio::io::stdout(), LinesCodec::new());

        tracing::info!("MCP server listening on stdio");

        while let Some(line) = input.next().await {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Some(response) = self.handle_message(&line).await {
                output.send(serde_json::to_string(&response)?).await?;
            }
        }

        tracing::info!("Stdin closed, MCP server stopping");
        Ok(())
    }
}

fn to_result<T: serde::Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}
