/// Tool Registry
///
/// The single routing authority: holds the tool catalog, its three lookup
/// indexes, the health cache, and the request/error/duration counters.
/// `Registry::route` is the hot path every ingress surface (MCP Handler,
/// HTTP Bridge) converges on.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{watch, RwLock};

use crate::core::errors::ErrorType;
use crate::core::monitor::Monitor;
use crate::core::sanitize;
use crate::core::tool::{category_of, Tool, ToolResult};

/// How often the background loop refreshes `health_cache` on its own.
const HEALTH_REFRESH_INTERVAL: StdDuration = StdDuration::from_secs(60);
/// How stale `last_health_check` may get before `get_health` forces a
/// synchronous refresh.
const HEALTH_STALENESS_LIMIT: chrono::Duration = chrono::Duration::seconds(30);
/// Default timeout applied to `Tool::execute` when a tool's declared
/// `capabilities.timeout_ms` is absent or zero.
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Default)]
pub struct DiscoverFilter {
    pub category: Option<String>,
    pub capability: Option<String>,
    pub healthy: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub total_tools: usize,
    pub healthy_tools: usize,
    pub last_health_check: DateTime<Utc>,
    pub average_response_time_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub total_tools: usize,
    pub request_count: u64,
    pub error_count: u64,
    pub total_response_time_ms: u64,
    pub average_response_time_ms: f64,
}

struct Indexes {
    by_name: HashMap<String, Arc<dyn Tool>>,
    by_endpoint: HashMap<String, String>,
    by_category: HashMap<String, Vec<String>>,
    /// Registration order, the externally observable ordering contract
    /// for `discover`/`list_tools`.
    order: Vec<String>,
}

impl Indexes {
    fn new() -> Self {
        Self {
            by_name: HashMap::new(),
            by_endpoint: HashMap::new(),
            by_category: HashMap::new(),
            order: Vec::new(),
        }
    }
}

pub struct Registry {
    indexes: RwLock<Indexes>,
    health_cache: RwLock<HashMap<String, bool>>,
    last_health_check: RwLock<DateTime<Utc>>,
    request_count: AtomicU64,
    error_count: AtomicU64,
    total_response_time_ms: AtomicU64,
    monitor: Arc<Monitor>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Registry {
    pub fn new(monitor: Arc<Monitor>) -> Arc<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Arc::new(Self {
            indexes: RwLock::new(Indexes::new()),
            health_cache: RwLock::new(HashMap::new()),
            last_health_check: RwLock::new(Utc::now()),
            request_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            total_response_time_ms: AtomicU64::new(0),
            monitor,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Register a tool. Rejects contract violations, duplicate names, and
    /// duplicate endpoints without silently replacing an existing entry.
    pub async fn register(&self, tool: Arc<dyn Tool>) -> Result<(), String> {
        let name = tool.name().to_string();
        let endpoint = tool.endpoint().to_string();

        if name.is_empty() {
            return Err("tool name must be non-empty".to_string());
        }
        sanitize::validate_endpoint(&endpoint)?;
        let schema = tool.schema();
        if !schema.is_object() {
            return Err("tool schema must be a JSON object".to_string());
        }

        let mut indexes = self.indexes.write().await;
        if indexes.by_name.contains_key(&name) {
            return Err(format!("tool '{}' is already registered", name));
        }
        if indexes.by_endpoint.contains_key(&endpoint) {
            return Err(format!("endpoint '{}' is already registered", endpoint));
        }

        let category = category_of(&name);
        let status = tool.status().await;

        indexes.by_name.insert(name.clone(), tool);
        indexes.by_endpoint.insert(endpoint.clone(), name.clone());
        indexes
            .by_category
            .entry(category.clone())
            .or_default()
            .push(name.clone());
        indexes.order.push(name.clone());
        drop(indexes);

        self.health_cache.write().await.insert(name.clone(), status.healthy);

        tracing::info!(tool = %name, category = %category, "registry.tool.registered");
        Ok(())
    }

    /// Remove a tool from all three indexes and the health cache
    /// atomically. Idempotent failures (tool not found) are reported, not
    /// silently swallowed.
    pub async fn unregister(&self, name: &str) -> Result<(), String> {
        let mut indexes = self.indexes.write().await;
        let tool = indexes
            .by_name
            .remove(name)
            .ok_or_else(|| "tool not found".to_string())?;

        indexes.by_endpoint.remove(tool.endpoint());
        let category = category_of(name);
        if let Some(names) = indexes.by_category.get_mut(&category) {
            names.retain(|n| n != name);
            if names.is_empty() {
                indexes.by_category.remove(&category);
            }
        }
        indexes.order.retain(|n| n != name);
        drop(indexes);

        self.health_cache.write().await.remove(name);
        Ok(())
    }

    /// List tools matching an optional filter, in registration order.
    pub async fn discover(&self, filter: Option<DiscoverFilter>) -> Vec<Arc<dyn Tool>> {
        let filter = filter.unwrap_or_default();
        let indexes = self.indexes.read().await;
        let health_cache = self.health_cache.read().await;

        let mut out = Vec::new();
        for name in &indexes.order {
            let tool = match indexes.by_name.get(name) {
                Some(t) => t,
                None => continue,
            };
            if let Some(category) = &filter.category {
                if &category_of(name) != category {
                    continue;
                }
            }
            if let Some(capability) = &filter.capability {
                let caps = tool.capabilities();
                let matches = match capability.as_str() {
                    "async" => caps.is_async,
                    "retryable" => caps.retryable,
                    "batchable" => caps.batchable,
                    "requiresAuth" => caps.requires_auth,
                    _ => false,
                };
                if !matches {
                    continue;
                }
            }
            if let Some(healthy) = filter.healthy {
                let is_healthy = health_cache.get(name).copied().unwrap_or(true);
                if is_healthy != healthy {
                    continue;
                }
            }
            out.push(tool.clone());
        }
        out
    }

    /// The hot path: validate endpoint, sanitize params, look the tool up,
    /// consult health, validate against the tool's own schema, execute
    /// under a timeout, and update the aggregate counters.
    pub async fn route(&self, endpoint: &str, params: Value) -> ToolResult {
        let start = std::time::Instant::now();
        let request_id = self.monitor.requests.start_request(endpoint).await;

        if let Err(msg) = sanitize::validate_endpoint(endpoint) {
            self.record_outcome(None, endpoint, false, start.elapsed(), &request_id).await;
            return ToolResult::failure(ErrorType::Validation, msg);
        }

        let sanitized = sanitize::sanitize_value(&params);

        let tool = {
            let indexes = self.indexes.read().await;
            match indexes.by_endpoint.get(endpoint) {
                Some(name) => indexes.by_name.get(name).cloned(),
                None => None,
            }
        };

        let tool = match tool {
            Some(t) => t,
            None => {
                let registered: Vec<String> = {
                    let indexes = self.indexes.read().await;
                    indexes.by_endpoint.keys().cloned().collect()
                };
                self.record_outcome(None, endpoint, false, start.elapsed(), &request_id).await;
                return ToolResult::failure(ErrorType::Validation, "unknown endpoint")
                    .with_metadata(
                        serde_json::Map::from_iter([(
                            "registeredEndpoints".to_string(),
                            serde_json::json!(registered),
                        )]),
                    );
            }
        };

        let name = tool.name().to_string();

        let is_healthy = self
            .health_cache
            .read()
            .await
            .get(&name)
            .copied()
            .unwrap_or(true);
        if !is_healthy {
            self.record_outcome(Some(&name), endpoint, false, start.elapsed(), &request_id).await;
            return ToolResult::failure(ErrorType::Execution, "tool unhealthy");
        }

        let validation = tool.validate(&sanitized).await;
        if !validation.valid {
            self.record_outcome(Some(&name), endpoint, false, start.elapsed(), &request_id).await;
            return ToolResult::failure(
                ErrorType::Validation,
                validation.errors.join("; "),
            )
            .with_metadata(serde_json::Map::from_iter([(
                "errors".to_string(),
                serde_json::json!(validation.errors),
            )]));
        }

        let timeout_ms = match tool.capabilities().timeout_ms {
            0 => DEFAULT_TIMEOUT_MS,
            ms => ms,
        };

        let result = tokio::time::timeout(
            StdDuration::from_millis(timeout_ms),
            tool.execute(sanitized),
        )
        .await;

        let (result, success) = match result {
            Ok(tool_result) => {
                let success = tool_result.success;
                (tool_result, success)
            }
            Err(_) => (
                ToolResult::failure(ErrorType::Timeout, "tool execution timed out"),
                false,
            ),
        };

        self.record_outcome(Some(&name), endpoint, success, start.elapsed(), &request_id).await;
        result
    }

    async fn record_outcome(
        &self,
        tool_name: Option<&str>,
        endpoint: &str,
        success: bool,
        elapsed: std::time::Duration,
        request_id: &str,
    ) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        if !success {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        self.monitor.requests.finish(request_id, success).await;
        self.monitor
            .record_tool_request(
                tool_name.unwrap_or("unknown"),
                endpoint,
                success,
                elapsed.as_millis() as u64,
            )
            .await;
    }

    pub async fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.indexes.read().await.by_name.get(name).cloned()
    }

    pub async fn get_tool_by_endpoint(&self, endpoint: &str) -> Option<Arc<dyn Tool>> {
        let indexes = self.indexes.read().await;
        let name = indexes.by_endpoint.get(endpoint)?;
        indexes.by_name.get(name).cloned()
    }

    pub async fn list_tools(&self) -> Vec<Arc<dyn Tool>> {
        self.discover(None).await
    }

    pub async fn get_tools_by_category(&self, category: &str) -> Vec<Arc<dyn Tool>> {
        self.discover(Some(DiscoverFilter {
            category: Some(category.to_string()),
            ..Default::default()
        }))
        .await
    }

    /// Returns the aggregate health snapshot, forcing a synchronous
    /// refresh if the cache is stale beyond `HEALTH_STALENESS_LIMIT`.
    pub async fn get_health(&self) -> HealthSnapshot {
        let stale = {
            let last = *self.last_health_check.read().await;
            Utc::now() - last > HEALTH_STALENESS_LIMIT
        };
        if stale {
            self.refresh_health_cache().await;
        }

        let indexes = self.indexes.read().await;
        let health_cache = self.health_cache.read().await;
        let total_tools = indexes.by_name.len();
        let healthy_tools = indexes
            .order
            .iter()
            .filter(|n| health_cache.get(*n).copied().unwrap_or(true))
            .count();

        HealthSnapshot {
            total_tools,
            healthy_tools,
            last_health_check: *self.last_health_check.read().await,
            average_response_time_ms: self.average_response_time_ms(),
        }
    }

    pub async fn get_statistics(&self) -> Statistics {
        let total_tools = self.indexes.read().await.by_name.len();
        Statistics {
            total_tools,
            request_count: self.request_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            total_response_time_ms: self.total_response_time_ms.load(Ordering::Relaxed),
            average_response_time_ms: self.average_response_time_ms(),
        }
    }

    fn average_response_time_ms(&self) -> f64 {
        let requests = self.request_count.load(Ordering::Relaxed);
        if requests == 0 {
            return 0.0;
        }
        self.total_response_time_ms.load(Ordering::Relaxed) as f64 / requests as f64
    }

    /// Refresh `health_cache` by calling `status()` on every tool in
    /// parallel (one spawned task per tool, joined together); a panic-free
    /// timeout per task marks a stuck tool unhealthy rather than blocking
    /// the refresh, and a whole refresh costs ~one status call's worth of
    /// wall clock regardless of how many tools are registered.
    async fn refresh_health_cache(&self) {
        let tools: Vec<(String, Arc<dyn Tool>)> = {
            let indexes = self.indexes.read().await;
            indexes
                .by_name
                .iter()
                .map(|(name, tool)| (name.clone(), tool.clone()))
                .collect()
        };

        let mut joins = tokio::task::JoinSet::new();
        for (name, tool) in tools {
            joins.spawn(async move {
                let healthy = match tokio::time::timeout(StdDuration::from_secs(5), tool.status()).await
                {
                    Ok(status) => status.healthy,
                    Err(_) => {
                        tracing::warn!(tool = %name, "registry.health.status_timeout");
                        false
                    }
                };
                (name, healthy)
            });
        }

        let mut results = Vec::with_capacity(joins.len());
        while let Some(outcome) = joins.join_next().await {
            if let Ok(entry) = outcome {
                results.push(entry);
            }
        }

        let mut health_cache = self.health_cache.write().await;
        for (name, healthy) in results {
            health_cache.insert(name, healthy);
        }
        *self.last_health_check.write().await = Utc::now();
    }

    /// Spawn the 60s background health-refresh loop. Cancellable via
    /// `Registry::stop`.
    pub fn spawn_health_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = self.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEALTH_REFRESH_INTERVAL);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        registry.refresh_health_cache().await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("registry.health_loop.stopped");
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Signal the background health loop (and any other registry-owned
    /// background task) to stop within one tick.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::monitor::Monitor;
    use crate::core::tool::{Capabilities, ToolStatus, ValidationOutcome};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU64 as StdAtomicU64};

    struct StubTool {
        name: String,
        endpoint: String,
        healthy: AtomicBool,
        fail: bool,
        hang: bool,
        status_delay_ms: u64,
        calls: StdAtomicU64,
    }

    impl StubTool {
        fn new(name: &str, endpoint: &str) -> Self {
            Self {
                name: name.to_string(),
                endpoint: endpoint.to_string(),
                healthy: AtomicBool::new(true),
                fail: false,
                hang: false,
                status_delay_ms: 0,
                calls: StdAtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl Tool for StubTool {
        fn name(&self) -> &str {
            &self.name
        }
        fn endpoint(&self) -> &str {
            &self.endpoint
        }
        fn description(&self) -> &str {
            "stub"
        }
        fn schema(&self) -> Value {
            serde_json::json!({"type": "object", "properties": {}, "required": []})
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities {
                timeout_ms: if self.hang { 10 } else { 30_000 },
                ..Default::default()
            }
        }
        async fn execute(&self, _params: Value) -> ToolResult {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.hang {
                tokio::time::sleep(StdDuration::from_secs(5)).await;
            }
            if self.fail {
                ToolResult::failure(ErrorType::Execution, "boom")
            } else {
                ToolResult::success(serde_json::json!({"ok": true}))
            }
        }
        async fn validate(&self, _params: &Value) -> ValidationOutcome {
            ValidationOutcome::ok()
        }
        async fn status(&self) -> ToolStatus {
            if self.status_delay_ms > 0 {
                tokio::time::sleep(StdDuration::from_millis(self.status_delay_ms)).await;
            }
            ToolStatus {
                healthy: self.healthy.load(Ordering::Relaxed),
                ..Default::default()
            }
        }
    }

    fn registry() -> Arc<Registry> {
        Registry::new(Monitor::new())
    }

    #[tokio::test]
    async fn register_then_route_succeeds() {
        let reg = registry();
        reg.register(Arc::new(StubTool::new("echo", "/tools/echo")))
            .await
            .unwrap();
        let result = reg.route("/tools/echo", serde_json::json!({})).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn duplicate_name_rejected() {
        let reg = registry();
        reg.register(Arc::new(StubTool::new("echo", "/tools/echo")))
            .await
            .unwrap();
        let err = reg
            .register(Arc::new(StubTool::new("echo", "/tools/echo2")))
            .await
            .unwrap_err();
        assert!(err.contains("already registered"));
    }

    #[tokio::test]
    async fn duplicate_endpoint_rejected() {
        let reg = registry();
        reg.register(Arc::new(StubTool::new("echo", "/tools/echo")))
            .await
            .unwrap();
        let err = reg
            .register(Arc::new(StubTool::new("echo2", "/tools/echo")))
            .await
            .unwrap_err();
        assert!(err.contains("already registered"));
    }

    #[tokio::test]
    async fn invalid_endpoint_rejected_at_registration() {
        let reg = registry();
        let err = reg
            .register(Arc::new(StubTool::new("echo", "no-leading-slash")))
            .await
            .unwrap_err();
        assert!(!err.is_empty());
    }

    #[tokio::test]
    async fn unregister_removes_from_all_indexes() {
        let reg = registry();
        reg.register(Arc::new(StubTool::new("echo", "/tools/echo")))
            .await
            .unwrap();
        reg.unregister("echo").await.unwrap();

        assert!(reg.get_tool("echo").await.is_none());
        assert!(reg.get_tool_by_endpoint("/tools/echo").await.is_none());
        assert!(reg.get_tools_by_category("echo").await.is_empty());

        let result = reg.route("/tools/echo", serde_json::json!({})).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn unregister_unknown_tool_errors() {
        let reg = registry();
        assert!(reg.unregister("nope").await.is_err());
    }

    #[tokio::test]
    async fn route_unknown_endpoint_lists_registered() {
        let reg = registry();
        reg.register(Arc::new(StubTool::new("echo", "/tools/echo")))
            .await
            .unwrap();
        let result = reg.route("/tools/missing", serde_json::json!({})).await;
        assert!(!result.success);
        assert_eq!(result.error_type, Some(ErrorType::Validation));
        let metadata = result.metadata.unwrap();
        assert!(metadata.get("registeredEndpoints").is_some());
    }

    #[tokio::test]
    async fn health_refresh_runs_tool_status_calls_concurrently() {
        let reg = registry();
        for i in 0..5 {
            let mut tool = StubTool::new(&format!("tool_{}", i), &format!("/tools/tool_{}", i));
            tool.status_delay_ms = 200;
            reg.register(Arc::new(tool)).await.unwrap();
        }

        let start = std::time::Instant::now();
        reg.refresh_health_cache().await;
        let elapsed = start.elapsed();

        // Five tools each taking 200ms would serialize to ~1s; a
        // concurrent refresh finishes in about one status call's worth of
        // time regardless of tool count.
        assert!(
            elapsed < StdDuration::from_millis(600),
            "refresh took {:?}, expected well under serial 1000ms",
            elapsed
        );

        let health = reg.get_health().await;
        assert_eq!(health.healthy_tools, 5);
    }

    #[tokio::test]
    async fn unhealthy_tool_is_rejected() {
        let reg = registry();
        let tool = Arc::new(StubTool::new("echo", "/tools/echo"));
        tool.healthy.store(false, Ordering::Relaxed);
        reg.register(tool).await.unwrap();
        let result = reg.route("/tools/echo", serde_json::json!({})).await;
        assert!(!result.success);
        assert_eq!(result.error_type, Some(ErrorType::Execution));
    }

    #[tokio::test]
    async fn timeout_marks_execution_as_timeout() {
        let reg = registry();
        let mut tool = StubTool::new("echo", "/tools/echo");
        tool.hang = true;
        reg.register(Arc::new(tool)).await.unwrap();
        let result = reg.route("/tools/echo", serde_json::json!({})).await;
        assert!(!result.success);
        assert_eq!(result.error_type, Some(ErrorType::Timeout));
    }

    #[tokio::test]
    async fn counters_track_requests_and_errors() {
        let reg = registry();
        let mut failing = StubTool::new("echo", "/tools/echo");
        failing.fail = true;
        reg.register(Arc::new(failing)).await.unwrap();

        reg.route("/tools/echo", serde_json::json!({})).await;
        reg.route("/tools/echo", serde_json::json!({})).await;

        let stats = reg.get_statistics().await;
        assert_eq!(stats.request_count, 2);
        assert_eq!(stats.error_count, 2);
        assert!(stats.error_count <= stats.request_count);
    }

    #[tokio::test]
    async fn route_rolls_requests_into_the_monitor_completed_ring() {
        let reg = registry();
        reg.register(Arc::new(StubTool::new("echo", "/tools/echo")))
            .await
            .unwrap();
        reg.route("/tools/echo", serde_json::json!({})).await;

        assert_eq!(reg.monitor.requests.in_flight_count().await, 0);
        let completed = reg.monitor.requests.completed_snapshot().await;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].label, "/tools/echo");
        assert_eq!(completed[0].success, Some(true));
    }

    #[tokio::test]
    async fn discover_reflects_new_registration() {
        let reg = registry();
        assert!(reg.discover(None).await.is_empty());
        reg.register(Arc::new(StubTool::new("echo", "/tools/echo")))
            .await
            .unwrap();
        let found = reg.discover(None).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), "echo");
    }

    #[tokio::test]
    async fn discover_filters_by_healthy() {
        let reg = registry();
        let unhealthy = Arc::new(StubTool::new("echo", "/tools/echo"));
        unhealthy.healthy.store(false, Ordering::Relaxed);
        reg.register(unhealthy).await.unwrap();
        reg.register(Arc::new(StubTool::new("weather_today", "/tools/weather")))
            .await
            .unwrap();

        let healthy_only = reg
            .discover(Some(DiscoverFilter {
                healthy: Some(true),
                ..Default::default()
            }))
            .await;
        assert_eq!(healthy_only.len(), 1);
        assert_eq!(healthy_only[0].name(), "weather_today");
    }
}
