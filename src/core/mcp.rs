/// MCP Protocol Handler
///
/// Speaks MCP revision 2025-06-18 over JSON-RPC 2.0 with a single peer.
/// Exposes the Registry's tool catalog (`tools/list`) and executions
/// (`tools/call`), plus the handshake methods (`initialize`,
/// `initialized`, `shutdown`).
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::core::registry::{DiscoverFilter, Registry};
use crate::core::tool::ToolResult;

/// JSON-RPC 2.0 request envelope. `id` is `None` for notifications.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Option<Value>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Build an error response from a `decode_line` failure. The id is
    /// always `None` since a line that failed to decode never yielded one.
    pub fn from_decode_error(err: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: None,
            result: None,
            error: Some(err),
        }
    }
}

/// MCP JSON-RPC error codes used by this handler.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const NOT_INITIALIZED: i64 = -32099;
}

/// Handler state machine. `Initializing` is not a distinct observable
/// state since `initialize` completes synchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpState {
    Fresh,
    Ready,
    ShutDown,
}

/// Title-case a tool name: replace `_` with spaces, capitalize each word.
fn title_of(name: &str) -> String {
    name.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct McpHandler {
    registry: Arc<Registry>,
    state: RwLock<McpState>,
    server_name: String,
    server_version: String,
    log_level: String,
}

impl McpHandler {
    pub fn new(
        registry: Arc<Registry>,
        server_name: impl Into<String>,
        server_version: impl Into<String>,
        log_level: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            state: RwLock::new(McpState::Fresh),
            server_name: server_name.into(),
            server_version: server_version.into(),
            log_level: log_level.into(),
        }
    }

    pub async fn state(&self) -> McpState {
        *self.state.read().await
    }

    /// Decode one line of input into a request/notification envelope, or
    /// an MCP-shaped error if the line is malformed.
    pub fn decode_line(line: &str) -> Result<JsonRpcRequest, JsonRpcError> {
        let value: Value = serde_json::from_str(line).map_err(|e| JsonRpcError {
            code: codes::PARSE_ERROR,
            message: format!("Parse error: {}", e),
            data: None,
        })?;

        let request: JsonRpcRequest = serde_json::from_value(value.clone()).map_err(|e| {
            JsonRpcError {
                code: codes::INVALID_REQUEST,
                message: format!("Invalid request: {}", e),
                data: None,
            }
        })?;

        if request.jsonrpc.as_deref() != Some("2.0") {
            return Err(JsonRpcError {
                code: codes::INVALID_REQUEST,
                message: "jsonrpc must be \"2.0\"".to_string(),
                data: None,
            });
        }
        if request.method.is_none() {
            return Err(JsonRpcError {
                code: codes::INVALID_REQUEST,
                message: "method is required".to_string(),
                data: None,
            });
        }
        match &request.id {
            None | Some(Value::String(_)) | Some(Value::Number(_)) | Some(Value::Null) => {}
            Some(_) => {
                return Err(JsonRpcError {
                    code: codes::INVALID_REQUEST,
                    message: "id must be a string, number, or null".to_string(),
                    data: None,
                })
            }
        }
        Ok(request)
    }

    /// Dispatch a decoded request/notification to the matching MCP method.
    /// Returns `None` for notifications (no response is sent).
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let is_notification = request.id.is_none();
        let method = request.method.clone().unwrap_or_default();

        if is_notification {
            if method == "notifications/initialized" {
                tracing::debug!("mcp.notifications.initialized");
            }
            return None;
        }

        let id = request.id.clone();

        if method != "initialize" && method != "shutdown" {
            let state = self.state().await;
            if state != McpState::Ready {
                return Some(JsonRpcResponse::failure(
                    id,
                    codes::NOT_INITIALIZED,
                    "server not initialized",
                ));
            }
        }

        let response = match method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "initialized" => Ok(serde_json::json!({})),
            "tools/list" => self.handle_tools_list().await,
            "tools/call" => self.handle_tools_call(request.params).await,
            "shutdown" => self.handle_shutdown().await,
            other => {
                return Some(JsonRpcResponse::failure(
                    id,
                    codes::METHOD_NOT_FOUND,
                    format!("Method not found: {}", other),
                ))
            }
        };

        Some(match response {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => JsonRpcResponse::failure(id, err.code, err.message),
        })
    }

    async fn handle_initialize(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        if let Some(params) = &params {
            if let Some(version) = params.get("protocolVersion").and_then(Value::as_str) {
                if !version.starts_with("2025") {
                    tracing::warn!(protocol_version = version, "mcp.initialize.unexpected_version");
                }
            }
        }
        *self.state.write().await = McpState::Ready;
        Ok(serde_json::json!({
            "name": self.server_name,
            "version": self.server_version,
            "protocolVersion": "2025-06-18",
            "capabilities": {
                "tools": {},
                "resources": {},
                "prompts": {},
                "logging": { "level": self.log_level },
            }
        }))
    }

    async fn handle_tools_list(&self) -> Result<Value, JsonRpcError> {
        let tools = self
            .registry
            .discover(Some(DiscoverFilter {
                healthy: Some(true),
                ..Default::default()
            }))
            .await;

        let entries: Vec<Value> = tools
            .iter()
            .map(|tool| {
                let caps = tool.capabilities();
                let mut annotations = serde_json::Map::new();
                if caps.requires_auth {
                    annotations.insert(
                        "security".to_string(),
                        Value::String("Requires authentication".to_string()),
                    );
                }
                if !caps.retryable {
                    annotations.insert(
                        "warning".to_string(),
                        Value::String("not retryable".to_string()),
                    );
                }
                if tool.name() == "browser_evaluate" {
                    annotations.insert(
                        "warning".to_string(),
                        Value::String(
                            "This tool executes arbitrary JavaScript. Use with caution."
                                .to_string(),
                        ),
                    );
                }
                serde_json::json!({
                    "name": tool.name(),
                    "title": title_of(tool.name()),
                    "description": tool.description(),
                    "inputSchema": tool.schema(),
                    "annotations": annotations,
                })
            })
            .collect();

        Ok(serde_json::json!({ "tools": entries }))
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params = params.ok_or_else(|| JsonRpcError {
            code: codes::INVALID_PARAMS,
            message: "Invalid params".to_string(),
            data: None,
        })?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| JsonRpcError {
                code: codes::INVALID_PARAMS,
                message: "Invalid params: missing 'name'".to_string(),
                data: None,
            })?;

        let arguments = params.get("arguments").cloned().unwrap_or(serde_json::json!({}));

        let tool = self.registry.get_tool(name).await.ok_or_else(|| JsonRpcError {
            code: codes::METHOD_NOT_FOUND,
            message: format!("Unknown tool: {}", name),
            data: None,
        })?;

        let result = self.registry.route(tool.endpoint(), arguments).await;
        Ok(shape_tool_call_result(&result))
    }

    async fn handle_shutdown(&self) -> Result<Value, JsonRpcError> {
        *self.state.write().await = McpState::ShutDown;
        Ok(serde_json::json!({}))
    }

    /// Error details for `details` blocks need the full catalog including
    /// unhealthy tools, deliberately distinct from `tools/list`'s
    /// healthy-only view (see design notes on this divergence).
    pub async fn all_tool_names(&self) -> Vec<String> {
        self.registry
            .discover(None)
            .await
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }
}

/// Shape a `ToolResult` into the MCP `tools/call` content schema.
fn shape_tool_call_result(result: &ToolResult) -> Value {
    if !result.success {
        return serde_json::json!({
            "content": [{
                "type": "text",
                "text": result.error.clone().unwrap_or_else(|| "Unknown error".to_string()),
            }],
            "isError": true,
        });
    }

    let data = result.data.clone().unwrap_or(Value::Null);

    if data.get("screenshot").is_some() {
        return serde_json::json!({
            "content": [{
                "type": "image",
                "data": data["screenshot"],
                "mimeType": "image/png",
            }],
            "isError": false,
        });
    }

    if let Some(html) = data.get("html").and_then(Value::as_str) {
        return serde_json::json!({
            "content": [{ "type": "text", "text": html }],
            "isError": false,
        });
    }
    if let Some(text) = data.get("text").and_then(Value::as_str) {
        return serde_json::json!({
            "content": [{ "type": "text", "text": text }],
            "isError": false,
        });
    }

    serde_json::json!({
        "content": [{
            "type": "text",
            "text": serde_json::to_string_pretty(&data).unwrap_or_default(),
        }],
        "isError": false,
    })
}
