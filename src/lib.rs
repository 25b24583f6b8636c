//! `smart-queue` serializes calls to the OSM API proxy through a single
//! rate-limit-aware queue.
//!
//! - [`SmartQueue`] executes requests one at a time, in enqueue order
//! - [`Transport`] is the seam to the network; [`HttpTransport`] is the
//!   `reqwest` implementation and [`MockTransport`] serves fixtures
//! - [`RateLimitInfo`] tracks `X-RateLimit-*` and `Retry-After` headers

// Expands to `tracing::debug!` when the `tracing` feature is enabled.
macro_rules! debug_log {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        tracing::debug!($($arg)*);
    };
}

mod error;
mod http;
mod mock;
mod options;
mod queue;
mod rate_limit;
mod request;
mod response;
mod transport;

pub use error::SmartQueueError;
pub use http::{proxy_url, HttpTransport, ENV_BASE_URL, ENV_TOKEN};
pub use mock::MockTransport;
pub use options::{QueueOptions, TransportOptions};
pub use queue::{PendingResponse, SmartQueue, SmartQueueBuilder};
pub use rate_limit::RateLimitInfo;
pub use request::{Method, Query, RequestSpec};
pub use response::{ApiResponse, Payload};
pub use transport::Transport;

pub type Result<T> = std::result::Result<T, SmartQueueError>;
