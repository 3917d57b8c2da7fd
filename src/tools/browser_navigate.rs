/// Browser Navigate Tool
///
/// A reference `browser_*` plugin: demonstrates category derivation
/// (`browser_navigate` → category `browser`) and the `requiresAuth`/
/// `retryable` capability flags the MCP handler surfaces as `tools/list`
/// annotations. The actual browser-extension round trip (dispatching the
/// navigation over the HTTP Bridge to the extension) is a tool-plugin
/// concern out of this crate's scope; this implementation validates and
/// shapes the request the way a real plugin would before handing off.
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::errors::ErrorType;
use crate::core::tool::{Capabilities, Tool, ToolResult, ToolStatus, ValidationOutcome};

pub struct BrowserNavigateTool;

pub fn tool() -> Arc<dyn Tool> {
    Arc::new(BrowserNavigateTool)
}

#[async_trait]
impl Tool for BrowserNavigateTool {
    fn name(&self) -> &str {
        "browser_navigate"
    }

    fn endpoint(&self) -> &str {
        "/tools/browser_navigate"
    }

    fn description(&self) -> &str {
        "Navigate the controlled browser tab to a URL."
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Absolute URL to navigate to"
                }
            },
            "required": ["url"]
        })
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            timeout_ms: 15_000,
            retryable: false,
            ..Capabilities::default()
        }
    }

    async fn execute(&self, params: Value) -> ToolResult {
        let url = match params.get("url").and_then(Value::as_str) {
            Some(u) => u,
            None => {
                return ToolResult::failure(ErrorType::Validation, "missing required parameter: url")
            }
        };

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return ToolResult::failure(ErrorType::Validation, "url must be an absolute http(s) URL");
        }

        ToolResult::success(serde_json::json!({ "text": format!("navigated to {}", url) }))
    }

    async fn validate(&self, params: &Value) -> ValidationOutcome {
        match params.get("url").and_then(Value::as_str) {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
                ValidationOutcome::ok()
            }
            Some(_) => ValidationOutcome::invalid(vec!["url must be an absolute http(s) URL".to_string()]),
            None => ValidationOutcome::invalid(vec!["missing required parameter: url".to_string()]),
        }
    }

    async fn status(&self) -> ToolStatus {
        ToolStatus::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn navigates_to_valid_url() {
        let tool = BrowserNavigateTool;
        let result = tool.execute(serde_json::json!({"url": "https://example.com"})).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn rejects_non_http_scheme() {
        let tool = BrowserNavigateTool;
        let result = tool.execute(serde_json::json!({"url": "javascript:alert(1)"})).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn validate_requires_absolute_url() {
        let tool = BrowserNavigateTool;
        let outcome = tool.validate(&serde_json::json!({"url": "/relative"})).await;
        assert!(!outcome.valid);
    }

    #[test]
    fn category_is_browser() {
        assert_eq!(crate::core::tool::category_of("browser_navigate"), "browser");
    }
}
