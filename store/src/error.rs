use thiserror::Error;

/// Errors surfaced while constructing stores or decoding persisted records.
///
/// Lookups themselves never fail with this type: transport and I/O failures
/// during a query collapse into the [`Outcome`](crate::Outcome) carried by
/// the result's diagnostics.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Key failed sanitization
    #[error("invalid symbol key: {0}")]
    InvalidKey(String),

    /// Base URL is not usable as a store address
    #[error("invalid store url: {0}")]
    InvalidUrl(String),

    /// Sidecar text did not match the cache-info grammar
    #[error("malformed cache info: {0}")]
    MalformedCacheInfo(String),

    /// Timestamp could not be rendered
    #[error("timestamp formatting failed: {0}")]
    TimestampFormat(#[from] time::error::Format),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}
