/// Configures pacing, quota handling and retry behavior of a
/// [`SmartQueue`](crate::SmartQueue).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QueueOptions {
    /// Minimum spacing between two dispatches in milliseconds.
    pub min_interval_ms: u64,
    /// Pause until quota reset once `remaining` drops to this value or below.
    pub rate_limit_threshold: u32,
    /// Extra wait added to quota-reset and `Retry-After` pauses.
    pub rate_limit_buffer_ms: u64,
    /// Maximum number of retries after a network failure.
    pub max_retries: usize,
    /// Backoff unit in milliseconds; retry `n` waits `n * retry_backoff_ms`.
    pub retry_backoff_ms: u64,
    /// Consecutive 429 responses tolerated per request. `None` retries forever.
    pub max_rate_limited_attempts: Option<usize>,
    /// Simulated latency of mock-mode responses.
    pub mock_latency_ms: u64,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            min_interval_ms: 1_000,
            rate_limit_threshold: 5,
            rate_limit_buffer_ms: 1_000,
            max_retries: 3,
            retry_backoff_ms: 1_000,
            max_rate_limited_attempts: Some(10),
            mock_latency_ms: 500,
        }
    }
}

/// Configures the HTTP transport.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransportOptions {
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}
