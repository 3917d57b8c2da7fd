/// Echo Tool
///
/// Demonstrates the minimal `Tool` implementation: echoes a `message`
/// parameter back, optionally prefixed via an env-var-configured prefix.
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::tool::{Capabilities, Tool, ToolStatus, ValidationOutcome};
use crate::core::tool::ToolResult;
use crate::core::utils;

pub struct EchoTool;

pub fn tool() -> Arc<dyn Tool> {
    Arc::new(EchoTool)
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn endpoint(&self) -> &str {
        "/tools/echo"
    }

    fn description(&self) -> &str {
        "Echo a message back to the client."
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message to echo"
                }
            },
            "required": ["message"]
        })
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            timeout_ms: 5_000,
            ..Capabilities::default()
        }
    }

    async fn execute(&self, params: Value) -> ToolResult {
        let message = match params.get("message").and_then(Value::as_str) {
            Some(m) => m,
            None => {
                return ToolResult::failure(
                    crate::core::errors::ErrorType::Validation,
                    "missing required parameter: message",
                )
            }
        };

        let prefix = utils::env_or("ECHO_PREFIX", "");
        let result = format!("{}{}", prefix, message);
        ToolResult::success(serde_json::json!({ "result": result }))
    }

    async fn validate(&self, params: &Value) -> ValidationOutcome {
        if params.get("message").and_then(Value::as_str).is_some() {
            ValidationOutcome::ok()
        } else {
            ValidationOutcome::invalid(vec!["missing required parameter: message".to_string()])
        }
    }

    async fn status(&self) -> ToolStatus {
        ToolStatus::default()
    }
}
