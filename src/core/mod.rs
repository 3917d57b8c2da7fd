/// Core Server Framework Module
///
/// - `errors`: the error taxonomy and `ServerError`/`ErrorContext` types.
/// - `tool`: the `Tool` trait contract and its supporting types.
/// - `sanitize`: endpoint validation, string/object sanitation, redaction.
/// - `monitor`: in-memory counters, gauges, timings, and request tracking.
/// - `registry`: the Tool Registry, the single routing authority.
/// - `mcp`: the MCP protocol handler (JSON-RPC 2.0 over stdio).
/// - `http`: the HTTP Bridge (actix-web).
/// - `foundation`: assembles the above into one handle.
/// - `quality_gate`: offline compliance/performance/security checks.
/// - `utils`: configuration layering helpers.
pub mod errors;
pub mod foundation;
pub mod http;
pub mod mcp;
pub mod monitor;
pub mod quality_gate;
pub mod registry;
pub mod sanitize;
pub mod tool;
pub mod utils;
