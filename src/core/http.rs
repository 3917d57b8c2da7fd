/// HTTP Bridge
///
/// Hosts the HTTP surface for browser-extension traffic and
/// system-introspection endpoints. Parses and hardens request bodies,
/// applies CORS to every response, and dispatches to the default system
/// routes plus whatever the Foundation mounts on top (`/tools`,
/// `/tools/execute`, per-tool endpoints).
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::dev::ServerHandle;
use actix_web::http::StatusCode;
use actix_web::middleware::{Compress, DefaultHeaders, Logger as ActixLogger};
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::core::mcp::McpHandler;
use crate::core::monitor::Monitor;
use crate::core::registry::Registry;
use crate::core::sanitize;
use crate::core::tool::ToolResult;

/// Hard cap on request bodies; exceeding this never reaches a handler.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// actix-web's own payload-extraction limit, set comfortably above
/// `MAX_BODY_BYTES` so the custom `dispatch` check below — which produces
/// the spec-mandated `{"error": "Request body too large"}` body, CORS
/// headers, and counter increments — is the one that actually fires for
/// an over-cap body. If this were left at actix's 256 KiB default (or set
/// too close to `MAX_BODY_BYTES`), actix would reject the body itself
/// before `dispatch` ever ran.
const PAYLOAD_EXTRACTION_LIMIT_BYTES: usize = MAX_BODY_BYTES + 16 * 1024 * 1024;

const CORS_ORIGIN: &str = "*";
const CORS_METHODS: &str = "GET, POST, OPTIONS";
const CORS_HEADERS: &str = "Content-Type, Authorization";
const CORS_MAX_AGE: &str = "86400";

#[derive(Clone)]
pub struct BridgeState {
    pub registry: Arc<Registry>,
    pub mcp: Arc<McpHandler>,
    pub monitor: Arc<Monitor>,
    pub started_at: std::time::Instant,
    pub request_count: Arc<AtomicU64>,
    pub error_count: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BridgeStatus {
    pub running: bool,
    pub port: Option<u16>,
    pub uptime_seconds: u64,
    pub request_count: u64,
    pub error_count: u64,
}

/// Runtime handle around the bound `actix-web` server, plus the counters
/// `getStatus()` reports.
pub struct Bridge {
    state: BridgeState,
    port: RwLock<Option<u16>>,
    handle: RwLock<Option<ServerHandle>>,
    started_at: Instant,
}

impl Bridge {
    pub fn new(registry: Arc<Registry>, mcp: Arc<McpHandler>, monitor: Arc<Monitor>) -> Self {
        let started_at = Instant::now();
        Self {
            state: BridgeState {
                registry,
                mcp,
                monitor,
                started_at,
                request_count: Arc::new(AtomicU64::new(0)),
                error_count: Arc::new(AtomicU64::new(0)),
            },
            port: RwLock::new(None),
            handle: RwLock::new(None),
            started_at,
        }
    }

    /// Bind a TCP listener and start serving. `EADDRINUSE` is surfaced as
    /// a dedicated "port in use" error rather than a generic I/O error.
    pub async fn start(&self, port: u16) -> Result<(), String> {
        let state = web::Data::new(self.state.clone());

        let workers = std::env::var("WORKER_THREADS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or_else(|| num_cpus::get().min(16).max(1));

        let server = HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .app_data(web::PayloadConfig::new(PAYLOAD_EXTRACTION_LIMIT_BYTES))
                .wrap(Compress::default())
                .wrap(
                    DefaultHeaders::new()
                        .add(("X-Content-Type-Options", "nosniff"))
                        .add(("X-Frame-Options", "DENY")),
                )
                .wrap(ActixLogger::new("%r %s %Dms"))
                .default_service(web::route().to(dispatch))
        })
        .workers(workers)
        .max_connections(10_000)
        .max_connection_rate(1_000)
        .keep_alive(Duration::from_secs(30))
        .client_request_timeout(Duration::from_secs(30))
        .client_disconnect_timeout(Duration::from_secs(2))
        .shutdown_timeout(10);

        let bound = server.bind(("0.0.0.0", port)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                format!("port in use: {}", port)
            } else {
                format!("failed to bind: {}", e)
            }
        })?;

        let running = bound.run();
        let handle = running.handle();
        tokio::spawn(running);

        *self.handle.write().await = Some(handle);
        *self.port.write().await = Some(port);
        tracing::info!(port, "http_bridge.started");
        Ok(())
    }

    /// Stop accepting new connections and wait for in-flight handlers.
    pub async fn stop(&self) {
        if let Some(handle) = self.handle.write().await.take() {
            handle.stop(true).await;
        }
        *self.port.write().await = None;
    }

    pub async fn get_status(&self) -> BridgeStatus {
        BridgeStatus {
            running: self.port.read().await.is_some(),
            port: *self.port.read().await,
            uptime_seconds: self.started_at.elapsed().as_secs(),
            request_count: self.state.request_count.load(Ordering::Relaxed),
            error_count: self.state.error_count.load(Ordering::Relaxed),
        }
    }
}

fn cors_headers() -> Vec<(&'static str, &'static str)> {
    vec![
        ("Access-Control-Allow-Origin", CORS_ORIGIN),
        ("Access-Control-Allow-Methods", CORS_METHODS),
        ("Access-Control-Allow-Headers", CORS_HEADERS),
        ("Access-Control-Max-Age", CORS_MAX_AGE),
    ]
}

fn with_cors(mut response: HttpResponse) -> HttpResponse {
    for (name, value) in cors_headers() {
        if let Ok(header_name) = actix_web::http::header::HeaderName::from_bytes(name.as_bytes()) {
            response
                .headers_mut()
                .insert(header_name, actix_web::http::header::HeaderValue::from_static(value));
        }
    }
    response
}

/// Accepted content-type families for request bodies.
fn accepted_content_type(content_type: &str) -> bool {
    let ct = content_type.to_lowercase();
    ct.is_empty()
        || ct.contains("application/json")
        || ct.contains("application/x-www-form-urlencoded")
        || ct.contains("text/plain")
        || ct.contains("text/html")
}

/// Parse and sanitize a raw request body per content type. Returns a
/// sanitized `serde_json::Value` regardless of wire shape so downstream
/// code has one representation to work with.
fn parse_body(content_type: &str, raw: &[u8]) -> Result<Value, String> {
    let ct = content_type.to_lowercase();

    if ct.contains("application/json") {
        if raw.is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        let parsed: Value =
            serde_json::from_slice(raw).map_err(|e| format!("invalid JSON body: {}", e))?;
        return Ok(sanitize::sanitize_value(&parsed));
    }

    if ct.contains("application/x-www-form-urlencoded") {
        let pairs: Vec<(String, String)> =
            serde_urlencoded::from_bytes(raw).map_err(|e| format!("invalid form body: {}", e))?;
        let mut map = serde_json::Map::new();
        for (key, value) in pairs {
            map.insert(key, Value::String(value));
        }
        return Ok(sanitize::sanitize_value(&Value::Object(map)));
    }

    // text/plain, text/html, or empty content type: sanitize as a string.
    let text = String::from_utf8_lossy(raw).to_string();
    Ok(sanitize::sanitize_value(&Value::String(text)))
}

async fn dispatch(req: HttpRequest, body: web::Bytes, data: web::Data<BridgeState>) -> HttpResponse {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.path().to_string();

    if method == actix_web::http::Method::OPTIONS {
        return with_cors(HttpResponse::Ok().finish());
    }

    data.request_count.fetch_add(1, Ordering::Relaxed);

    if body.len() > MAX_BODY_BYTES {
        let response = with_cors(
            HttpResponse::build(StatusCode::BAD_REQUEST)
                .json(serde_json::json!({"error": "Request body too large"})),
        );
        data.error_count.fetch_add(1, Ordering::Relaxed);
        data.monitor
            .record_http_request(method.as_str(), &path, 400, start.elapsed().as_millis() as u64)
            .await;
        return response;
    }

    let content_type = req
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if !accepted_content_type(&content_type) {
        let response = with_cors(
            HttpResponse::build(StatusCode::BAD_REQUEST)
                .json(serde_json::json!({"error": "Unsupported content type"})),
        );
        data.error_count.fetch_add(1, Ordering::Relaxed);
        data.monitor
            .record_http_request(method.as_str(), &path, 400, start.elapsed().as_millis() as u64)
            .await;
        return response;
    }

    let parsed_body = match parse_body(&content_type, &body) {
        Ok(v) => v,
        Err(message) => {
            let response = with_cors(
                HttpResponse::build(StatusCode::BAD_REQUEST).json(serde_json::json!({
                    "error": "Bad Request",
                    "message": message,
                })),
            );
            data.error_count.fetch_add(1, Ordering::Relaxed);
            data.monitor
                .record_http_request(method.as_str(), &path, 400, start.elapsed().as_millis() as u64)
                .await;
            return response;
        }
    };

    let (response, status) = route_request(&data, method.as_str(), &path, parsed_body).await;
    if status >= 400 {
        data.error_count.fetch_add(1, Ordering::Relaxed);
    }
    data.monitor
        .record_http_request(method.as_str(), &path, status, start.elapsed().as_millis() as u64)
        .await;
    with_cors(response)
}

/// A routed tool result is always 200 on success; on failure the status
/// follows `ErrorType::http_status()` (validation/transport failures map
/// to 4xx/5xx, not a blanket 200).
fn tool_result_status(result: &ToolResult) -> u16 {
    if result.success {
        200
    } else {
        result.error_type.map(|t| t.http_status()).unwrap_or(500)
    }
}

fn tool_result_response(result: ToolResult) -> (HttpResponse, u16) {
    let status = tool_result_status(&result);
    (
        HttpResponse::build(StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
            .json(result),
        status,
    )
}

/// Every default route is registered under both `GET` and `POST` per
/// spec (`method` is accepted but not discriminated on for these paths);
/// only the wildcard `/tools/*` arm and the 404 fallback care about
/// anything other than `path`.
async fn route_request(
    data: &BridgeState,
    _method: &str,
    path: &str,
    body: Value,
) -> (HttpResponse, u16) {
    match path {
        "/health" => {
            let health = data.registry.get_health().await;
            let healthy = health.healthy_tools == health.total_tools || health.total_tools == 0;
            let status = if healthy { 200 } else { 503 };
            (
                HttpResponse::build(StatusCode::from_u16(status).unwrap()).json(serde_json::json!({
                    "status": if healthy { "healthy" } else { "unhealthy" },
                    "uptime": data.started_at.elapsed().as_secs(),
                    "timestamp": chrono::Utc::now(),
                })),
                status,
            )
        }
        "/status" => {
            let stats = data.registry.get_statistics().await;
            let error_rate = if stats.request_count == 0 {
                0.0
            } else {
                stats.error_count as f64 / stats.request_count as f64
            };
            (
                HttpResponse::Ok().json(serde_json::json!({
                    "uptime": data.started_at.elapsed().as_secs(),
                    "requestCount": stats.request_count,
                    "errorCount": stats.error_count,
                    "errorRate": error_rate,
                    "averageResponseTimeMs": stats.average_response_time_ms,
                })),
                200,
            )
        }
        "/routes" => (
            HttpResponse::Ok().json(serde_json::json!({
                "routes": ["/health", "/status", "/routes", "/tools", "/tools/execute"],
            })),
            200,
        ),
        "/tools" => {
            let tools = data.mcp.all_tool_names().await;
            (HttpResponse::Ok().json(serde_json::json!({ "tools": tools })), 200)
        }
        "/tools/execute" => {
            let tool = body.get("tool").and_then(Value::as_str).map(str::to_string);
            let tool = match tool {
                Some(t) => t,
                None => {
                    return (
                        HttpResponse::build(StatusCode::BAD_REQUEST)
                            .json(serde_json::json!({"error": "missing 'tool' field"})),
                        400,
                    )
                }
            };
            let params = body.get("params").cloned().unwrap_or(serde_json::json!({}));
            let tool_ref = match data.registry.get_tool(&tool).await {
                Some(t) => t,
                None => {
                    return (
                        HttpResponse::build(StatusCode::BAD_REQUEST)
                            .json(serde_json::json!({"error": format!("unknown tool: {}", tool)})),
                        400,
                    )
                }
            };
            let result = data.registry.route(tool_ref.endpoint(), params).await;
            tool_result_response(result)
        }
        p if p.starts_with("/tools/") => {
            let endpoint = p.to_string();
            let result = data.registry.route(&endpoint, body).await;
            tool_result_response(result)
        }
        _ => (
            HttpResponse::build(StatusCode::NOT_FOUND).json(serde_json::json!({
                "error": "Not Found",
                "availableRoutes": ["/health", "/status", "/routes", "/tools", "/tools/execute"],
            })),
            404,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_content_types() {
        assert!(accepted_content_type("application/json"));
        assert!(accepted_content_type("application/x-www-form-urlencoded"));
        assert!(accepted_content_type("text/plain"));
        assert!(accepted_content_type("text/html"));
        assert!(accepted_content_type(""));
    }

    #[test]
    fn rejects_unknown_content_types() {
        assert!(!accepted_content_type("application/octet-stream"));
    }

    #[test]
    fn empty_json_body_becomes_empty_object() {
        let parsed = parse_body("application/json", b"").unwrap();
        assert_eq!(parsed, serde_json::json!({}));
    }

    #[test]
    fn json_body_is_sanitized() {
        let parsed = parse_body(
            "application/json",
            br#"{"script_key": "<script>alert(1)</script>ok"}"#,
        )
        .unwrap();
        assert_eq!(parsed["script_key"], serde_json::json!("ok"));
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(parse_body("application/json", b"{not json").is_err());
    }

    #[test]
    fn form_urlencoded_is_parsed_and_sanitized() {
        let parsed = parse_body("application/x-www-form-urlencoded", b"a=1&b=%3Cscript%3Ex").unwrap();
        assert_eq!(parsed["a"], serde_json::json!("1"));
    }

    #[tokio::test]
    async fn body_over_cap_is_rejected_by_dispatch_with_spec_shaped_response() {
        let state = bridge_state();
        let data = web::Data::new(state.clone());

        let oversized = web::Bytes::from(vec![0u8; MAX_BODY_BYTES + (1024 * 1024)]);
        let req = actix_web::test::TestRequest::post()
            .uri("/tools/execute")
            .insert_header(("content-type", "application/json"))
            .to_http_request();

        let resp = dispatch(req, oversized, data).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            resp.headers().get("Access-Control-Allow-Origin").unwrap(),
            "*"
        );

        let body = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Request body too large");

        assert_eq!(state.request_count.load(Ordering::Relaxed), 1);
        assert_eq!(state.error_count.load(Ordering::Relaxed), 1);
    }

    fn bridge_state() -> BridgeState {
        let monitor = Monitor::new();
        let registry = Registry::new(monitor.clone());
        let mcp = Arc::new(McpHandler::new(registry.clone(), "test", "0.1.0", "info"));
        BridgeState {
            registry,
            mcp,
            monitor,
            started_at: Instant::now(),
            request_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
        }
    }

    #[tokio::test]
    async fn dispatch_tracks_request_and_error_counts() {
        let state = bridge_state();
        let data = web::Data::new(state.clone());

        let ok_req = actix_web::test::TestRequest::get().uri("/health").to_http_request();
        let ok_resp = dispatch(ok_req, web::Bytes::new(), data.clone()).await;
        assert_eq!(ok_resp.status(), StatusCode::OK);

        let missing_req = actix_web::test::TestRequest::get().uri("/nope").to_http_request();
        let missing_resp = dispatch(missing_req, web::Bytes::new(), data.clone()).await;
        assert_eq!(missing_resp.status(), StatusCode::NOT_FOUND);

        assert_eq!(state.request_count.load(Ordering::Relaxed), 2);
        assert_eq!(state.error_count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn options_request_gets_cors_without_counting() {
        let state = bridge_state();
        let data = web::Data::new(state.clone());
        let req = actix_web::test::TestRequest::default()
            .method(actix_web::http::Method::OPTIONS)
            .to_http_request();
        let resp = dispatch(req, web::Bytes::new(), data).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(state.request_count.load(Ordering::Relaxed), 0);
    }
}
