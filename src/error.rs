/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum SmartQueueError {
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Network-level failure reported by a non-`reqwest` transport.
    #[error("connection error: {0}")]
    Connection(String),
    /// Non-success HTTP status with the upstream error text.
    #[error("http error {status}: {message}")]
    Http { status: u16, message: String },
    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// Upstream rejected credentials after the proxy already tried a refresh.
    #[error("{0}")]
    Unauthorized(String),
    /// Upstream has blocked the application; all queued work was flushed.
    #[error("{0}")]
    Blocked(String),
    /// Request kept receiving 429 until the configured attempt cap.
    #[error("rate limited on {attempts} consecutive attempts")]
    RateLimited {
        /// Number of attempts that each returned 429.
        attempts: usize,
    },
    /// Request was dropped from the queue before an outcome was known.
    #[error("request aborted before completion")]
    Aborted,
    /// Invalid or missing configuration.
    #[error("config error: {0}")]
    Config(String),
}
