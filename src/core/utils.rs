/// Configuration Layering
///
/// CLI flags (via `clap`, parsed in `main.rs`) take precedence over
/// environment variables, which take precedence over these defaults.
/// `env_or` is the single helper both layers read through, so the
/// precedence rule lives in one place.
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_SERVER_NAME: &str = "browser-mcp-server";
const DEFAULT_TRANSPORT: &str = "stdio";
const DEFAULT_HTTP_PORT: u16 = 3024;

/// Get an environment variable's value, falling back to `default` if it is
/// unset or empty.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Parse a `u16` environment variable, falling back to `default` on
/// absence or parse failure.
pub fn env_u16_or(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(default)
}

pub fn default_log_level() -> String {
    env_or("MANE_LOG_LEVEL", DEFAULT_LOG_LEVEL)
}

pub fn default_server_name() -> String {
    env_or("MANE_SERVER_NAME", DEFAULT_SERVER_NAME)
}

pub fn default_server_version() -> String {
    env_or("MANE_SERVER_VERSION", env!("CARGO_PKG_VERSION"))
}

pub fn default_http_port() -> u16 {
    env_u16_or("MANE_HTTP_PORT", DEFAULT_HTTP_PORT)
}

/// Transport mode, read directly from the teacher's pre-existing
/// `MCP_TRANSPORT_MODE` variable: orthogonal to the Foundation's own
/// config knobs, so it does not go through `env_or`'s `MANE_` family.
pub fn default_transport() -> String {
    env_or("MCP_TRANSPORT_MODE", DEFAULT_TRANSPORT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_on_absence() {
        assert_eq!(env_or("MANE_DEFINITELY_UNSET_VAR", "fallback"), "fallback");
    }

    #[test]
    fn env_u16_or_falls_back_on_bad_value() {
        std::env::set_var("MANE_TEST_BAD_PORT", "not-a-number");
        assert_eq!(env_u16_or("MANE_TEST_BAD_PORT", 9999), 9999);
        std::env::remove_var("MANE_TEST_BAD_PORT");
    }

    #[test]
    fn env_u16_or_parses_valid_value() {
        std::env::set_var("MANE_TEST_GOOD_PORT", "8080");
        assert_eq!(env_u16_or("MANE_TEST_GOOD_PORT", 9999), 8080);
        std::env::remove_var("MANE_TEST_GOOD_PORT");
    }

    #[test]
    fn default_http_port_falls_back_to_3024() {
        std::env::remove_var("MANE_HTTP_PORT");
        assert_eq!(default_http_port(), 3024);
    }
}
