/// Error Taxonomy
///
/// Every error that crosses a component boundary (Registry, MCP Handler,
/// HTTP Bridge) is shaped into an `ErrorContext` carrying a typed
/// `ErrorType`, a human message, and enough detail for the caller to decide
/// whether to retry.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Taxonomy of error categories a boundary can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    Validation,
    Execution,
    Timeout,
    Connection,
    Authentication,
    RateLimit,
    Internal,
}

impl ErrorType {
    /// Whether callers may retry an error of this type.
    ///
    /// `TIMEOUT`, `CONNECTION`, and `RATE_LIMIT` are transient; everything
    /// else (including `VALIDATION`) is terminal.
    pub fn recoverable(self) -> bool {
        matches!(
            self,
            ErrorType::Timeout | ErrorType::Connection | ErrorType::RateLimit
        )
    }

    /// The JSON-RPC error code this error type maps to when surfaced
    /// through the MCP handler.
    pub fn mcp_code(self) -> i64 {
        match self {
            ErrorType::Validation => -32602,
            ErrorType::Internal => -32603,
            ErrorType::Authentication => -32001,
            ErrorType::RateLimit => -32002,
            ErrorType::Connection => -32003,
            ErrorType::Timeout => -32004,
            ErrorType::Execution => -32000,
        }
    }

    /// The HTTP status code this error type maps to when surfaced through
    /// the HTTP bridge.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorType::Validation => 400,
            ErrorType::Authentication => 401,
            ErrorType::RateLimit => 429,
            ErrorType::Timeout => 504,
            ErrorType::Connection => 502,
            ErrorType::Execution | ErrorType::Internal => 500,
        }
    }
}

/// Structured context attached to an error as it crosses a boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    pub recoverable: bool,
}

impl ErrorContext {
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        let recoverable = error_type.recoverable();
        Self {
            error_type,
            message: message.into(),
            code: None,
            details: None,
            timestamp: Utc::now(),
            recoverable,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a jittered retry delay to `details.retry_after_ms`, for
    /// recoverable errors only. A no-op on terminal errors.
    pub fn with_retry_hint(mut self, attempt: u32) -> Self {
        if !self.recoverable {
            return self;
        }
        let delay_ms = backoff_ms(attempt);
        let mut details = self.details.unwrap_or_else(|| serde_json::json!({}));
        if let Some(obj) = details.as_object_mut() {
            obj.insert("retry_after_ms".to_string(), serde_json::json!(delay_ms));
        }
        self.details = Some(details);
        self
    }
}

/// Top-level server error type, convertible into the boundary-specific
/// shapes (`ErrorContext`, JSON-RPC error, HTTP status) as needed.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Execution(String),
    #[error("operation timed out: {0}")]
    Timeout(String),
    #[error("{0}")]
    Connection(String),
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    RateLimit(String),
    #[error("{0}")]
    Internal(String),
    #[error("port in use: {0}")]
    PortInUse(u16),
    #[error("already started")]
    AlreadyStarted,
}

impl ServerError {
    pub fn error_type(&self) -> ErrorType {
        match self {
            ServerError::Validation(_) => ErrorType::Validation,
            ServerError::Execution(_) => ErrorType::Execution,
            ServerError::Timeout(_) => ErrorType::Timeout,
            ServerError::Connection(_) => ErrorType::Connection,
            ServerError::Authentication(_) => ErrorType::Authentication,
            ServerError::RateLimit(_) => ErrorType::RateLimit,
            ServerError::Internal(_) | ServerError::PortInUse(_) | ServerError::AlreadyStarted => {
                ErrorType::Internal
            }
        }
    }

    pub fn to_context(&self) -> ErrorContext {
        ErrorContext::new(self.error_type(), self.to_string())
    }
}

/// Exponential backoff with jitter: base 1s, cap 30s, ±10%.
pub fn backoff_ms(attempt: u32) -> u64 {
    use rand::Rng;
    let base_ms: u64 = 1_000;
    let cap_ms: u64 = 30_000;
    let exp = base_ms.saturating_mul(1u64 << attempt.min(8));
    let capped = exp.min(cap_ms);
    let jitter_range = (capped as f64 * 0.10) as i64;
    let mut rng = rand::thread_rng();
    let jitter: i64 = rng.gen_range(-jitter_range..=jitter_range);
    (capped as i64 + jitter).max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_terminal() {
        assert!(!ErrorType::Validation.recoverable());
    }

    #[test]
    fn timeout_connection_ratelimit_are_recoverable() {
        assert!(ErrorType::Timeout.recoverable());
        assert!(ErrorType::Connection.recoverable());
        assert!(ErrorType::RateLimit.recoverable());
    }

    #[test]
    fn backoff_respects_cap() {
        for attempt in 0..20 {
            assert!(backoff_ms(attempt) <= 33_000);
        }
    }

    #[test]
    fn retry_hint_only_on_recoverable() {
        let ctx = ErrorContext::new(ErrorType::Validation, "bad input").with_retry_hint(0);
        assert!(ctx.details.is_none());

        let ctx = ErrorContext::new(ErrorType::Timeout, "slow tool").with_retry_hint(0);
        assert!(ctx.details.unwrap().get("retry_after_ms").is_some());
    }
}
