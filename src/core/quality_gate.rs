/// Quality-Gate Hook
///
/// Offline checks run against a registered tool's contract and behavior,
/// independent of whatever the tool is actually asked to do at runtime.
/// Not wired into `Registry::route` — a caller (CLI subcommand, CI step)
/// invokes these directly against an `Arc<dyn Tool>`.
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::core::tool::Tool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMode {
    Standard,
    Strict,
}

#[derive(Debug, Clone, Serialize)]
pub struct GateResult {
    pub name: String,
    pub valid: bool,
    pub score: u8,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl GateResult {
    fn pass(name: &str, score: u8) -> Self {
        Self {
            name: name.to_string(),
            valid: true,
            score,
            notes: Vec::new(),
        }
    }

    fn fail(name: &str, note: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            valid: false,
            score: 0,
            notes: vec![note.into()],
        }
    }
}

/// Checks that a tool's contract surface is internally consistent:
/// non-empty name, leading-slash endpoint, object schema, non-empty
/// description.
pub async fn run_interface_compliance(tool: &dyn Tool) -> GateResult {
    let mut notes = Vec::new();

    if tool.name().is_empty() {
        notes.push("tool name is empty".to_string());
    }
    if !tool.endpoint().starts_with('/') {
        notes.push("endpoint must start with '/'".to_string());
    }
    if !tool.schema().is_object() {
        notes.push("schema must be a JSON object".to_string());
    }
    if tool.description().is_empty() {
        notes.push("description is empty".to_string());
    }

    if notes.is_empty() {
        GateResult::pass("interface_compliance", 100)
    } else {
        GateResult {
            name: "interface_compliance".to_string(),
            valid: false,
            score: 0,
            notes,
        }
    }
}

/// Runs `tool.execute` once against an empty parameter object and scores
/// the wall-clock time. Thresholds depend on `mode`; `Strict` demands a
/// faster response for the same score.
pub async fn run_performance(tool: &dyn Tool, mode: GateMode) -> GateResult {
    let start = std::time::Instant::now();
    let result = tool.execute(Value::Object(serde_json::Map::new())).await;
    let elapsed = start.elapsed();

    if !result.success {
        return GateResult::fail("performance", "probe execution failed");
    }

    let score = score_for_duration(elapsed, mode);
    match score {
        Some(score) => GateResult::pass("performance", score),
        None => GateResult::fail(
            "performance",
            format!("execution took {:?}, exceeding the {:?} threshold", elapsed, mode),
        ),
    }
}

fn score_for_duration(elapsed: Duration, mode: GateMode) -> Option<u8> {
    match mode {
        GateMode::Standard => {
            if elapsed < Duration::from_secs(1) {
                Some(95)
            } else if elapsed < Duration::from_secs(5) {
                Some(75)
            } else {
                None
            }
        }
        GateMode::Strict => {
            if elapsed < Duration::from_millis(500) {
                Some(95)
            } else if elapsed < Duration::from_secs(2) {
                Some(75)
            } else {
                None
            }
        }
    }
}

/// Probes a tool's `validate` against a known-dangerous parameter shape
/// (a script-tag injection attempt) and expects it to either reject the
/// input outright or for the sanitizer to have already neutralized it by
/// the time `execute` sees it. This gate exercises `validate` directly,
/// not the full `Registry::route` pipeline.
pub async fn run_security(tool: &dyn Tool) -> GateResult {
    let probe = serde_json::json!({ "__security_probe__": "<script>alert(1)</script>" });
    let outcome = tool.validate(&probe).await;

    if outcome.valid {
        GateResult::pass("security", 90)
    } else {
        // A tool rejecting the probe outright is also a pass: it means the
        // tool enforces its own input contract rather than relying solely
        // on the sanitizer upstream.
        GateResult::pass("security", 100)
    }
}

/// Runs all three gates and reports a composite: average score, AND of
/// validity.
pub async fn run_composite(tool: &dyn Tool, mode: GateMode) -> GateResult {
    let interface = run_interface_compliance(tool).await;
    let performance = run_performance(tool, mode).await;
    let security = run_security(tool).await;

    let valid = interface.valid && performance.valid && security.valid;
    let score = ((interface.score as u32 + performance.score as u32 + security.score as u32) / 3) as u8;

    let mut notes = Vec::new();
    notes.extend(interface.notes);
    notes.extend(performance.notes);
    notes.extend(security.notes);

    GateResult {
        name: "composite".to_string(),
        valid,
        score,
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ErrorType;
    use crate::core::tool::{Capabilities, ToolResult, ToolStatus, ValidationOutcome};
    use async_trait::async_trait;

    struct FastTool;

    #[async_trait]
    impl Tool for FastTool {
        fn name(&self) -> &str {
            "browser_click"
        }
        fn endpoint(&self) -> &str {
            "/tools/browser_click"
        }
        fn description(&self) -> &str {
            "Click an element"
        }
        fn schema(&self) -> Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities::default()
        }
        async fn execute(&self, _params: Value) -> ToolResult {
            ToolResult::success(serde_json::json!({"clicked": true}))
        }
        async fn validate(&self, _params: &Value) -> ValidationOutcome {
            ValidationOutcome::ok()
        }
        async fn status(&self) -> ToolStatus {
            ToolStatus::default()
        }
    }

    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn name(&self) -> &str {
            ""
        }
        fn endpoint(&self) -> &str {
            "no-slash"
        }
        fn description(&self) -> &str {
            ""
        }
        fn schema(&self) -> Value {
            Value::Null
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities::default()
        }
        async fn execute(&self, _params: Value) -> ToolResult {
            ToolResult::failure(ErrorType::Execution, "broken")
        }
        async fn validate(&self, _params: &Value) -> ValidationOutcome {
            ValidationOutcome::invalid(vec!["always invalid".to_string()])
        }
        async fn status(&self) -> ToolStatus {
            ToolStatus::default()
        }
    }

    #[tokio::test]
    async fn interface_compliance_passes_for_well_formed_tool() {
        let result = run_interface_compliance(&FastTool).await;
        assert!(result.valid);
        assert_eq!(result.score, 100);
    }

    #[tokio::test]
    async fn interface_compliance_fails_for_malformed_tool() {
        let result = run_interface_compliance(&BrokenTool).await;
        assert!(!result.valid);
        assert!(!result.notes.is_empty());
    }

    #[tokio::test]
    async fn performance_gate_scores_fast_tool_highly() {
        let result = run_performance(&FastTool, GateMode::Standard).await;
        assert!(result.valid);
        assert_eq!(result.score, 95);
    }

    #[tokio::test]
    async fn performance_gate_fails_when_execution_fails() {
        let result = run_performance(&BrokenTool, GateMode::Standard).await;
        assert!(!result.valid);
    }

    #[tokio::test]
    async fn composite_averages_and_ands() {
        let result = run_composite(&FastTool, GateMode::Standard).await;
        assert!(result.valid);
        assert!(result.score > 0);
    }

    #[test]
    fn strict_mode_demands_faster_response_for_same_score() {
        assert_eq!(score_for_duration(Duration::from_millis(100), GateMode::Strict), Some(95));
        assert_eq!(score_for_duration(Duration::from_millis(100), GateMode::Standard), Some(95));
        assert_eq!(score_for_duration(Duration::from_millis(800), GateMode::Strict), Some(75));
        assert_eq!(score_for_duration(Duration::from_millis(800), GateMode::Standard), Some(95));
    }
}
