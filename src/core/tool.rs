/// Tool Contract
///
/// A `Tool` is a named capability exposed by the server (e.g.
/// `browser_navigate`). Tool *implementations* are external collaborators
/// registered at startup (see `tools::*`); this module defines only the
/// contract surface the Registry and protocol handlers depend on.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::ErrorType;

/// Declared capabilities of a tool, used by the Registry's timeout
/// enforcement and by the MCP handler's `tools/list` annotations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(rename = "async")]
    pub is_async: bool,
    pub timeout_ms: u64,
    pub retryable: bool,
    pub batchable: bool,
    #[serde(rename = "requiresAuth")]
    pub requires_auth: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            is_async: true,
            timeout_ms: 30_000,
            retryable: true,
            batchable: false,
            requires_auth: false,
        }
    }
}

/// A tool's self-reported health/usage snapshot, as returned by
/// `Tool::status` and cached by the Registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
    pub execution_count: u64,
    pub avg_execution_time_ms: f64,
    pub error_rate: f64,
}

impl Default for ToolStatus {
    fn default() -> Self {
        Self {
            healthy: true,
            last_used: None,
            execution_count: 0,
            avg_execution_time_ms: 0.0,
            error_rate: 0.0,
        }
    }
}

/// Outcome of `Tool::validate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ValidationOutcome {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
            warnings: Vec::new(),
        }
    }
}

/// Result shape returned by `Tool::execute` and by the Registry when
/// routing itself fails before a tool ever runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "errorType", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, Value>>,
    pub timestamp: DateTime<Utc>,
}

impl ToolResult {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_type: None,
            metadata: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            error_type: Some(error_type),
            metadata: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// The contract every tool plugin must satisfy. Tool implementations
/// (navigate, screenshot, evaluate, ...) are out of scope for this crate;
/// they are registered by callers that construct an `Arc<dyn Tool>`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool identifier, e.g. `browser_navigate`.
    fn name(&self) -> &str;

    /// Routing key, must begin with `/` and be unique.
    fn endpoint(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON-Schema-shaped input descriptor.
    fn schema(&self) -> Value;

    fn capabilities(&self) -> Capabilities;

    async fn execute(&self, params: Value) -> ToolResult;

    async fn validate(&self, params: &Value) -> ValidationOutcome;

    async fn status(&self) -> ToolStatus;
}

/// Category is derived from the substring of `name` preceding the first
/// `_`, or `"general"` if there is no `_`.
pub fn category_of(name: &str) -> String {
    match name.split_once('_') {
        Some((prefix, _)) if !prefix.is_empty() => prefix.to_string(),
        _ => "general".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_derivation() {
        assert_eq!(category_of("browser_navigate"), "browser");
        assert_eq!(category_of("echo"), "general");
        assert_eq!(category_of("_weird"), "general");
    }
}
