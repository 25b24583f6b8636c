//! Server-advertised quota tracking.
//!
//! Reset timestamps arrive as unix seconds and are converted to a monotonic
//! [`Instant`] on receipt, so every pause is computed against the same clock
//! the queue sleeps on.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::header::HeaderMap;
use tokio::time::Instant;

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";
pub const HEADER_RETRY_AFTER: &str = "retry-after";

const DEFAULT_LIMIT: u32 = 1_000;

/// Last observed quota state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    /// When the quota replenishes. `None` until the server says so.
    pub reset_at: Option<Instant>,
    /// Pending pause requested by a 429, cleared once consumed.
    pub retry_after: Option<Duration>,
}

impl Default for RateLimitInfo {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            remaining: DEFAULT_LIMIT,
            reset_at: None,
            retry_after: None,
        }
    }
}

impl RateLimitInfo {
    /// State after an authentication failure: no quota left, reset unknown.
    pub(crate) fn exhausted() -> Self {
        Self {
            remaining: 0,
            ..Self::default()
        }
    }

    /// Overwrites only the fields whose headers are present and parse.
    /// Returns `true` if anything changed.
    pub(crate) fn update_from_headers(&mut self, headers: &HeaderMap) -> bool {
        self.update_at(headers, Instant::now(), SystemTime::now())
    }

    fn update_at(&mut self, headers: &HeaderMap, now: Instant, wall: SystemTime) -> bool {
        let mut changed = false;

        if let Some(limit) = header_number(headers, HEADER_LIMIT) {
            self.limit = u32::try_from(limit).unwrap_or(u32::MAX);
            changed = true;
        }
        if let Some(remaining) = header_number(headers, HEADER_REMAINING) {
            self.remaining = u32::try_from(remaining).unwrap_or(u32::MAX);
            changed = true;
        }
        if let Some(reset_at) =
            header_number(headers, HEADER_RESET).and_then(|reset| reset_deadline(reset, now, wall))
        {
            self.reset_at = Some(reset_at);
            changed = true;
        }
        if let Some(seconds) = header_number(headers, HEADER_RETRY_AFTER) {
            self.retry_after = Some(Duration::from_secs(seconds));
            changed = true;
        }

        changed
    }

    /// How long to hold dispatch because the quota is nearly spent.
    pub(crate) fn quota_delay(&self, threshold: u32, buffer: Duration, now: Instant) -> Option<Duration> {
        if self.remaining > threshold {
            return None;
        }
        let delay = match self.reset_at {
            Some(reset_at) => match reset_at.checked_add(buffer) {
                Some(resume_at) => resume_at.saturating_duration_since(now),
                None => reset_at.saturating_duration_since(now).saturating_add(buffer),
            },
            None => buffer,
        };
        (!delay.is_zero()).then_some(delay)
    }

    /// Consumes a pending `Retry-After` and returns the pause it demands.
    pub(crate) fn take_retry_after(&mut self, buffer: Duration) -> Option<Duration> {
        self.retry_after.take().map(|after| after.saturating_add(buffer))
    }
}

/// Remaining wait to keep `min_interval` between dispatches.
pub(crate) fn pacing_delay(
    last_dispatch: Option<Instant>,
    min_interval: Duration,
    now: Instant,
) -> Option<Duration> {
    let elapsed = now.saturating_duration_since(last_dispatch?);
    (elapsed < min_interval).then(|| min_interval - elapsed)
}

fn header_number(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
}

/// `None` when the timestamp lies beyond what the clocks can represent.
fn reset_deadline(reset_unix_secs: u64, now: Instant, wall: SystemTime) -> Option<Instant> {
    let reset = UNIX_EPOCH.checked_add(Duration::from_secs(reset_unix_secs))?;
    match reset.duration_since(wall) {
        Ok(ahead) => now.checked_add(ahead),
        Err(_) => Some(now),
    }
}
