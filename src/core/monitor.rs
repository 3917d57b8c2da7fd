/// Monitoring Substrate
///
/// Structured logging goes straight through `tracing`; this module adds
/// the in-memory counters/gauges/timings the rest of the crate reports
/// into, plus a capped ring of recently completed request records.
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Upper bound on the completed-request ring, so a long-running process
/// does not grow this buffer without bound.
const COMPLETED_RING_CAPACITY: usize = 1024;

/// A request's lifecycle record, from `start_request` to `finish`.
#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    pub id: String,
    pub label: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

/// Tracks in-flight and recently completed requests.
#[derive(Default)]
pub struct RequestTracker {
    in_flight: RwLock<HashMap<String, RequestRecord>>,
    completed: RwLock<VecDeque<RequestRecord>>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin tracking a request, returning its generated id.
    pub async fn start_request(&self, label: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let record = RequestRecord {
            id: id.clone(),
            label: label.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            success: None,
        };
        self.in_flight.write().await.insert(id.clone(), record);
        id
    }

    /// Finish tracking a request, rolling it into the completed ring.
    pub async fn finish(&self, id: &str, success: bool) {
        let mut record = match self.in_flight.write().await.remove(id) {
            Some(r) => r,
            None => return,
        };
        record.finished_at = Some(Utc::now());
        record.success = Some(success);

        let mut completed = self.completed.write().await;
        if completed.len() >= COMPLETED_RING_CAPACITY {
            completed.pop_front();
        }
        completed.push_back(record);
    }

    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.read().await.len()
    }

    pub async fn completed_snapshot(&self) -> Vec<RequestRecord> {
        self.completed.read().await.iter().cloned().collect()
    }
}

/// Lock-free counters for the common request/error/duration aggregates,
/// plus a tagged timing log for ad-hoc histograms.
#[derive(Default)]
pub struct Metrics {
    counters: RwLock<HashMap<String, AtomicU64>>,
    gauges: RwLock<HashMap<String, i64>>,
    timings: RwLock<HashMap<String, Vec<u64>>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn increment(&self, name: &str) {
        self.increment_by(name, 1).await;
    }

    pub async fn increment_by(&self, name: &str, amount: u64) {
        let counters = self.counters.read().await;
        if let Some(counter) = counters.get(name) {
            counter.fetch_add(amount, Ordering::Relaxed);
            return;
        }
        drop(counters);
        let mut counters = self.counters.write().await;
        counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(amount, Ordering::Relaxed);
    }

    pub async fn counter(&self, name: &str) -> u64 {
        self.counters
            .read()
            .await
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub async fn set_gauge(&self, name: &str, value: i64) {
        self.gauges.write().await.insert(name.to_string(), value);
    }

    pub async fn gauge(&self, name: &str) -> i64 {
        self.gauges.read().await.get(name).copied().unwrap_or(0)
    }

    /// Record a tagged timing (duration in milliseconds). `tags` is
    /// flattened into the metric name (`name{k=v,...}`) since this is an
    /// in-memory substrate, not a Prometheus exporter.
    pub async fn record_timing(&self, name: &str, tags: &[(&str, &str)], duration_ms: u64) {
        let key = tagged_key(name, tags);
        self.timings.write().await.entry(key).or_default().push(duration_ms);
    }

    pub async fn timing_samples(&self, name: &str, tags: &[(&str, &str)]) -> Vec<u64> {
        let key = tagged_key(name, tags);
        self.timings.read().await.get(&key).cloned().unwrap_or_default()
    }
}

fn tagged_key(name: &str, tags: &[(&str, &str)]) -> String {
    if tags.is_empty() {
        return name.to_string();
    }
    let mut parts: Vec<String> = tags.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    parts.sort();
    format!("{}{{{}}}", name, parts.join(","))
}

/// Aggregates the Logger/Metrics/RequestTracker trio behind a single
/// shared handle so the Registry, MCP Handler, and HTTP Bridge can all
/// report into the same substrate.
pub struct Monitor {
    pub metrics: Metrics,
    pub requests: RequestTracker,
}

impl Monitor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            metrics: Metrics::new(),
            requests: RequestTracker::new(),
        })
    }

    /// Emit `http_bridge.request.duration` tagged `{method, path, status}`.
    pub async fn record_http_request(&self, method: &str, path: &str, status: u16, duration_ms: u64) {
        let status_str = status.to_string();
        self.metrics
            .record_timing(
                "http_bridge.request.duration",
                &[("method", method), ("path", path), ("status", &status_str)],
                duration_ms,
            )
            .await;
        self.metrics.increment("http_bridge.request.count").await;
        tracing::info!(
            method,
            path,
            status,
            duration_ms,
            "http_bridge.request.duration"
        );
    }

    /// Emit `registry.request.duration` tagged `{tool, endpoint, success}`.
    pub async fn record_tool_request(
        &self,
        tool: &str,
        endpoint: &str,
        success: bool,
        duration_ms: u64,
    ) {
        let success_str = success.to_string();
        self.metrics
            .record_timing(
                "registry.request.duration",
                &[("tool", tool), ("endpoint", endpoint), ("success", &success_str)],
                duration_ms,
            )
            .await;
        tracing::info!(
            tool,
            endpoint,
            success,
            duration_ms,
            "registry.request.duration"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counters_accumulate() {
        let metrics = Metrics::new();
        metrics.increment("x").await;
        metrics.increment_by("x", 4).await;
        assert_eq!(metrics.counter("x").await, 5);
    }

    #[tokio::test]
    async fn request_lifecycle_rolls_into_completed() {
        let tracker = RequestTracker::new();
        let id = tracker.start_request("test").await;
        assert_eq!(tracker.in_flight_count().await, 1);
        tracker.finish(&id, true).await;
        assert_eq!(tracker.in_flight_count().await, 0);
        let completed = tracker.completed_snapshot().await;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].success, Some(true));
    }

    #[tokio::test]
    async fn completed_ring_is_capped() {
        let tracker = RequestTracker::new();
        for _ in 0..(COMPLETED_RING_CAPACITY + 10) {
            let id = tracker.start_request("test").await;
            tracker.finish(&id, true).await;
        }
        assert_eq!(tracker.completed_snapshot().await.len(), COMPLETED_RING_CAPACITY);
    }
}
