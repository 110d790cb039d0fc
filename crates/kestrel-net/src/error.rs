use thiserror::Error;

/// Errors building an [`crate::HttpNetwork`]. Per-request failures are
/// reported as `kestrel_sync::network::NetworkError` instead.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid base url '{0}'")]
    InvalidBaseUrl(String),
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}
