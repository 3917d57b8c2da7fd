/// Input Hardening
///
/// Two responsibilities: reject malformed surface inputs (endpoints,
/// content types) and neutralize untrusted string content before it
/// reaches a tool or a log line.
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

const MAX_ENDPOINT_LEN: usize = 1000;
const MAX_STRING_LEN: usize = 10_000;

const SQL_KEYWORDS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "EXEC", "UNION",
];

const SECRET_KEY_MARKERS: &[&str] = &["password", "token", "secret", "key", "auth", "credential"];

const PROTOTYPE_POLLUTION_KEYS: &[&str] = &["__proto__", "constructor", "prototype"];

static ENDPOINT_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/[A-Za-z0-9_\-/]*$").expect("valid regex"));

static SCRIPT_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("valid regex")
});

static JAVASCRIPT_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)javascript:").expect("valid regex"));

static EVENT_HANDLER_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bon\w+\s*=").expect("valid regex"));

static SQL_KEYWORD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    let alternation = SQL_KEYWORDS.join("|");
    Regex::new(&format!(r"(?i)\b({})\b", alternation)).expect("valid regex")
});

/// Validate an endpoint string per spec: must be a non-empty string
/// starting with `/`, at most 1000 chars, free of `..`, `//`, script tags,
/// `javascript:`, and control characters, and matching the endpoint-shape
/// pattern.
pub fn validate_endpoint(endpoint: &str) -> Result<(), String> {
    if endpoint.is_empty() {
        return Err("endpoint must be non-empty".to_string());
    }
    if !endpoint.starts_with('/') {
        return Err("endpoint must start with '/'".to_string());
    }
    if endpoint.len() > MAX_ENDPOINT_LEN {
        return Err(format!("endpoint exceeds {} characters", MAX_ENDPOINT_LEN));
    }
    if endpoint.contains("..") {
        return Err("endpoint must not contain '..'".to_string());
    }
    if endpoint.contains("//") {
        return Err("endpoint must not contain '//'".to_string());
    }
    if endpoint.to_lowercase().contains("<script") {
        return Err("endpoint must not contain a script tag".to_string());
    }
    if endpoint.to_lowercase().contains("javascript:") {
        return Err("endpoint must not contain a javascript: scheme".to_string());
    }
    if endpoint.chars().any(|c| (c as u32) < 0x20) {
        return Err("endpoint must not contain control characters".to_string());
    }
    if !ENDPOINT_SHAPE.is_match(endpoint) {
        return Err("endpoint must match ^/[A-Za-z0-9_-/]*$".to_string());
    }
    Ok(())
}

/// Strip null bytes and the banned ASCII control-character set (everything
/// except horizontal tab, CR, LF, which are left alone).
fn strip_control_chars(input: &str) -> String {
    input
        .chars()
        .filter(|&c| {
            let code = c as u32;
            !(code == 0x00
                || (0x01..=0x08).contains(&code)
                || code == 0x0B
                || code == 0x0C
                || (0x0E..=0x1F).contains(&code)
                || code == 0x7F)
        })
        .collect()
}

/// Sanitize a single untrusted string: strip control chars, strip
/// script/javascript:/event-handler content, strip SQL keywords
/// (whole-word, case-insensitive), then truncate to 10 000 chars.
/// An empty result is represented as `None` by the caller.
pub fn sanitize_string(input: &str) -> Option<String> {
    let mut s = strip_control_chars(input);
    s = SCRIPT_TAG.replace_all(&s, "").to_string();
    s = JAVASCRIPT_SCHEME.replace_all(&s, "").to_string();
    s = EVENT_HANDLER_ATTR.replace_all(&s, "").to_string();
    s = SQL_KEYWORD_PATTERN.replace_all(&s, "").to_string();
    s = s.trim().to_string();
    if s.chars().count() > MAX_STRING_LEN {
        s = s.chars().take(MAX_STRING_LEN).collect();
    }
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Sanitize an object key: runs the string pipeline, then strips every
/// character outside `[A-Za-z0-9_]` so sanitized keys are always safe to
/// use as identifiers downstream.
fn sanitize_key(input: &str) -> Option<String> {
    let base = sanitize_string(input)?;
    let filtered: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if filtered.is_empty() {
        None
    } else {
        Some(filtered)
    }
}

/// Recursively sanitize a JSON value. Object keys are string-sanitized
/// (an empty sanitized key drops the pair); keys in the prototype-pollution
/// set are dropped outright; array members are sanitized element-wise;
/// scalars other than strings pass through untouched.
pub fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::String(s) => match sanitize_string(s) {
            Some(sanitized) => Value::String(sanitized),
            None => Value::Null,
        },
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, val) in map {
                if PROTOTYPE_POLLUTION_KEYS.contains(&key.as_str()) {
                    continue;
                }
                let sanitized_key = match sanitize_key(key) {
                    Some(k) => k,
                    None => continue,
                };
                out.insert(sanitized_key, sanitize_value(val));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Redact secret-shaped values from a parameter map before logging.
/// Keys whose lowercased name *contains* any marker in
/// `password, token, secret, key, auth, credential` have their value
/// replaced with the literal `"[REDACTED]"`. This is for log output only;
/// the original (sanitized) map is what reaches `Tool::execute`.
pub fn redact_for_logging(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, val) in map {
                let lower = key.to_lowercase();
                if SECRET_KEY_MARKERS.iter().any(|marker| lower.contains(marker)) {
                    out.insert(key.clone(), Value::String("[REDACTED]".to_string()));
                } else {
                    out.insert(key.clone(), redact_for_logging(val));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_for_logging).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn endpoint_valid() {
        assert!(validate_endpoint("/tools/browser_navigate").is_ok());
    }

    #[test]
    fn endpoint_invalid_cases() {
        assert!(validate_endpoint("no-leading-slash").is_err());
        assert!(validate_endpoint("/path/../etc").is_err());
        assert!(validate_endpoint("/double//slash").is_err());
        assert!(validate_endpoint("/invalid chars!").is_err());
        assert!(validate_endpoint("//malicious").is_err());
    }

    #[test]
    fn parameter_sanitation_scenario() {
        let input = json!({
            "valid_key": "valid value",
            "key!@#$%": "value",
            "script_key": "<script>alert('xss')</script>content",
            "js_key": "javascript:alert('test')",
            "number_key": 42,
            "bool_key": true,
            "array_key": ["item1", "  item2  ", "item3"]
        });
        let out = sanitize_value(&input);
        assert_eq!(out["valid_key"], json!("valid value"));
        assert_eq!(out["key"], json!("value"));
        assert_eq!(out["script_key"], json!("content"));
        assert_eq!(out["js_key"], json!("alert('test')"));
        assert_eq!(out["number_key"], json!(42));
        assert_eq!(out["bool_key"], json!(true));
        assert_eq!(out["array_key"], json!(["item1", "item2", "item3"]));
    }

    #[test]
    fn secret_redaction_scenario() {
        let input = json!({
            "username": "user123",
            "password": "secret123",
            "apiToken": "abc123",
            "secretKey": "xyz789",
            "normalData": "visible"
        });
        let out = redact_for_logging(&input);
        assert_eq!(out["username"], json!("user123"));
        assert_eq!(out["password"], json!("[REDACTED]"));
        assert_eq!(out["apiToken"], json!("[REDACTED]"));
        assert_eq!(out["secretKey"], json!("[REDACTED]"));
        assert_eq!(out["normalData"], json!("visible"));
    }

    #[test]
    fn sanitation_is_idempotent() {
        let input = json!({
            "a": "<script>alert(1)</script>DROP TABLE users",
            "nested": { "__proto__": "x", "b": "ok" }
        });
        let once = sanitize_value(&input);
        let twice = sanitize_value(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn prototype_pollution_keys_dropped() {
        let input = json!({"__proto__": "x", "constructor": "y", "prototype": "z", "ok": "1"});
        let out = sanitize_value(&input);
        assert_eq!(out.as_object().unwrap().len(), 1);
        assert_eq!(out["ok"], json!("1"));
    }

    #[test]
    fn empty_after_sanitize_becomes_null_in_object() {
        let input = json!({"script_only": "<script>alert(1)</script>"});
        let out = sanitize_value(&input);
        assert_eq!(out["script_only"], Value::Null);
    }

    #[test]
    fn truncates_long_strings() {
        let long = "a".repeat(20_000);
        let out = sanitize_string(&long).unwrap();
        assert_eq!(out.chars().count(), MAX_STRING_LEN);
    }
}
