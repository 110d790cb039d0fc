use tracing::warn;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub user_agent: String,
    pub max_response_bytes: usize,
}

impl Default for NodeClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:17001".to_string(),
            timeout_ms: 10_000,
            connect_timeout_ms: 3_000,
            user_agent: concat!("kestrel/", env!("CARGO_PKG_VERSION")).to_string(),
            max_response_bytes: 8 * 1024 * 1024,
        }
    }
}

impl NodeClientConfig {
    /// `KESTREL_NODE_URL`, `KESTREL_HTTP_TIMEOUT_MS`,
    /// `KESTREL_HTTP_CONNECT_TIMEOUT_MS` and `KESTREL_HTTP_MAX_RESPONSE_BYTES`,
    /// each falling back to its default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("KESTREL_NODE_URL").unwrap_or(defaults.base_url),
            timeout_ms: parsed("KESTREL_HTTP_TIMEOUT_MS", defaults.timeout_ms),
            connect_timeout_ms: parsed("KESTREL_HTTP_CONNECT_TIMEOUT_MS", defaults.connect_timeout_ms),
            user_agent: defaults.user_agent,
            max_response_bytes: parsed(
                "KESTREL_HTTP_MAX_RESPONSE_BYTES",
                defaults.max_response_bytes,
            ),
        }
    }
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring {}='{}': not a number", name, raw);
            default
        }),
        Err(_) => default,
    }
}
