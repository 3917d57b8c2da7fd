/// Foundation Assembly
///
/// Wires the Monitor, Registry, HTTP Bridge, and MCP Handler into one
/// handle, initializes the `tracing` subscriber, and owns the start/stop
/// lifecycle the CLI entry point drives.
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

use crate::core::errors::ServerError;
use crate::core::http::Bridge;
use crate::core::mcp::McpHandler;
use crate::core::monitor::Monitor;
use crate::core::registry::Registry;
use crate::core::tool::Tool;

#[derive(Debug, Clone)]
pub struct FoundationConfig {
    pub log_level: String,
    pub server_name: String,
    pub server_version: String,
    pub http_port: Option<u16>,
    pub enable_metrics: bool,
    pub enable_monitoring: bool,
}

impl Default for FoundationConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            server_name: "browser-mcp-server".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            http_port: None,
            enable_metrics: true,
            enable_monitoring: true,
        }
    }
}

/// Fluent builder over `FoundationConfig`, generalized from the teacher's
/// plain `(name, version)` argument pairs now that the config surface has
/// grown past a couple of positional parameters.
#[derive(Debug, Clone, Default)]
pub struct FoundationBuilder {
    config: FoundationConfig,
}

impl FoundationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.config.server_name = name.into();
        self
    }

    pub fn server_version(mut self, version: impl Into<String>) -> Self {
        self.config.server_version = version.into();
        self
    }

    pub fn http_port(mut self, port: Option<u16>) -> Self {
        self.config.http_port = port;
        self
    }

    pub fn enable_metrics(mut self, enabled: bool) -> Self {
        self.config.enable_metrics = enabled;
        self
    }

    pub fn enable_monitoring(mut self, enabled: bool) -> Self {
        self.config.enable_monitoring = enabled;
        self
    }

    /// Assemble the Monitor, Registry, Bridge, and MCP Handler. Does not
    /// start anything; call `Foundation::start` to bind the HTTP listener
    /// and spawn the registry's health loop.
    pub fn build(self) -> Foundation {
        let monitor = Monitor::new();
        let registry = Registry::new(monitor.clone());
        let mcp = Arc::new(McpHandler::new(
            registry.clone(),
            self.config.server_name.clone(),
            self.config.server_version.clone(),
            self.config.log_level.clone(),
        ));
        let bridge = Bridge::new(registry.clone(), mcp.clone(), monitor.clone());

        Foundation {
            config: self.config,
            monitor,
            registry,
            mcp,
            bridge: Arc::new(bridge),
            started: RwLock::new(false),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FoundationHealth {
    pub healthy: bool,
    pub registry: crate::core::registry::HealthSnapshot,
    pub bridge: crate::core::http::BridgeStatus,
}

pub struct Foundation {
    config: FoundationConfig,
    pub monitor: Arc<Monitor>,
    pub registry: Arc<Registry>,
    pub mcp: Arc<McpHandler>,
    pub bridge: Arc<Bridge>,
    started: RwLock<bool>,
}

impl Foundation {
    pub fn builder() -> FoundationBuilder {
        FoundationBuilder::new()
    }

    /// Initialize the global `tracing` subscriber from `log_level`. Must
    /// be called at most once per process; safe to skip in tests that
    /// install their own subscriber.
    pub fn init_logging(&self) {
        let filter = EnvFilter::try_new(&self.config.log_level)
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }

    /// Register a tool against the Registry. The HTTP Bridge resolves
    /// tool endpoints dynamically through the shared Registry handle, so
    /// no separate Bridge-side registration step is needed here.
    pub async fn register_tool(&self, tool: Arc<dyn Tool>) -> Result<(), String> {
        self.registry.register(tool).await
    }

    /// Start the registry's background health loop and, if `http_port`
    /// is configured, bind and start the HTTP Bridge. Idempotent: a
    /// second call returns `ServerError::AlreadyStarted`.
    pub async fn start(&self) -> Result<(), ServerError> {
        let mut started = self.started.write().await;
        if *started {
            return Err(ServerError::AlreadyStarted);
        }

        self.registry.spawn_health_loop();

        if let Some(port) = self.config.http_port {
            self.bridge
                .start(port)
                .await
                .map_err(|e| {
                    if e.contains("port in use") {
                        ServerError::PortInUse(port)
                    } else {
                        ServerError::Internal(e)
                    }
                })?;
        }

        *started = true;
        tracing::info!(
            server_name = %self.config.server_name,
            server_version = %self.config.server_version,
            "foundation.started"
        );
        Ok(())
    }

    /// Stop the HTTP Bridge and signal the registry's health loop to
    /// exit. A no-op when the Foundation was never started.
    pub async fn stop(&self) {
        let mut started = self.started.write().await;
        if !*started {
            return;
        }
        self.bridge.stop().await;
        self.registry.stop();
        *started = false;
        tracing::info!("foundation.stopped");
    }

    pub async fn is_started(&self) -> bool {
        *self.started.read().await
    }

    /// Aggregate health: `healthy` iff every registered tool reports
    /// healthy AND the Bridge (when started) reports running.
    pub async fn get_health(&self) -> FoundationHealth {
        let registry_health = self.registry.get_health().await;
        let bridge_status = self.bridge.get_status().await;

        let registry_healthy = registry_health.total_tools == 0
            || registry_health.healthy_tools == registry_health.total_tools;
        let bridge_healthy = self.config.http_port.is_none() || bridge_status.running;

        FoundationHealth {
            healthy: registry_healthy && bridge_healthy,
            registry: registry_health,
            bridge: bridge_status,
        }
    }

    pub fn config(&self) -> &FoundationConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tool::{Capabilities, ToolResult, ToolStatus, ValidationOutcome};
    use async_trait::async_trait;
    use serde_json::Value;

    struct StubTool;

    #[async_trait]
    impl Tool for StubTool {
        fn name(&self) -> &str {
            "browser_navigate"
        }
        fn endpoint(&self) -> &str {
            "/tools/browser_navigate"
        }
        fn description(&self) -> &str {
            "Navigate to a URL"
        }
        fn schema(&self) -> Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities::default()
        }
        async fn execute(&self, _params: Value) -> ToolResult {
            ToolResult::success(serde_json::json!({"ok": true}))
        }
        async fn validate(&self, _params: &Value) -> ValidationOutcome {
            ValidationOutcome::ok()
        }
        async fn status(&self) -> ToolStatus {
            ToolStatus::default()
        }
    }

    #[tokio::test]
    async fn builder_defaults_are_sane() {
        let foundation = Foundation::builder().build();
        assert_eq!(foundation.config().server_name, "browser-mcp-server");
        assert!(foundation.config().http_port.is_none());
    }

    #[tokio::test]
    async fn start_without_http_port_skips_bridge() {
        let foundation = Foundation::builder().http_port(None).build();
        foundation.start().await.unwrap();
        assert!(foundation.is_started().await);
        let health = foundation.get_health().await;
        assert!(health.bridge.port.is_none());
        foundation.stop().await;
        assert!(!foundation.is_started().await);
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let foundation = Foundation::builder().build();
        foundation.start().await.unwrap();
        let err = foundation.start().await.unwrap_err();
        assert!(matches!(err, ServerError::AlreadyStarted));
        foundation.stop().await;
    }

    #[tokio::test]
    async fn health_reflects_registered_tool() {
        let foundation = Foundation::builder().build();
        foundation.register_tool(Arc::new(StubTool)).await.unwrap();
        let health = foundation.get_health().await;
        assert!(health.healthy);
        assert_eq!(health.registry.total_tools, 1);
    }

    #[tokio::test]
    async fn stop_before_start_is_a_no_op() {
        let foundation = Foundation::builder().build();
        foundation.stop().await;
        assert!(!foundation.is_started().await);
    }
}
