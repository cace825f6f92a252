/// Default base URL for a locally hosted server.
pub const DEFAULT_BASE_URL: &str = "http://localhost:4096";

/// Normalize a configured base URL.
///
/// Rules:
/// 1) empty or blank input falls back to the default local endpoint
/// 2) a bare `host[:port]` gains an `http://` scheme
/// 3) trailing slashes are stripped so path joins stay predictable
pub fn normalize_base_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        input.trim()
    };

    let with_scheme = if base.contains("://") {
        base.to_string()
    } else {
        format!("http://{base}")
    };

    with_scheme.trim_end_matches('/').to_string()
}

/// Streaming push endpoint for a normalized base URL.
pub fn event_stream_url(base: &str) -> String {
    format!("{base}/event")
}
