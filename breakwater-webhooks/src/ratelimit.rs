//! Per-source flood control for webhook endpoints.
//!
//! A sliding window log per peer address: timestamps inside the window
//! are counted, older ones dropped on access. Precise at window
//! boundaries, which matters when a provider bursts redeliveries after
//! an outage. Providers retry 429s later, so throttling loses nothing.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::request::InboundRequest;

/// Bucket key for requests whose transport captured no peer address.
/// They all share one bucket; better to throttle them together than to
/// exempt them.
const UNKNOWN_SOURCE: &str = "unknown";

/// Sliding window log rate limiter keyed by peer address.
pub struct RateLimiter {
    max_requests: u64,
    window: Duration,
    log: DashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    /// # Panics
    ///
    /// Panics if `max_requests` is 0 or `window` is zero.
    pub fn new(max_requests: u64, window: Duration) -> Self {
        assert!(max_requests > 0, "max_requests must be at least 1");
        assert!(!window.is_zero(), "window must be non-zero");

        Self {
            max_requests,
            window,
            log: DashMap::new(),
        }
    }

    /// Limiter over a one minute window, the granularity providers
    /// document their own delivery rates in.
    pub fn per_minute(max_requests: u64) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    /// Records the request against its source bucket and says whether
    /// it is within the limit.
    pub fn allow(&self, req: &InboundRequest) -> bool {
        let key = req
            .client_ip()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());
        self.try_acquire(&key).0
    }

    /// Try to record a request under `key`, returning whether it was
    /// admitted and how many slots remain in the window.
    pub fn try_acquire(&self, key: &str) -> (bool, u64) {
        let now = Instant::now();
        let mut entry = self.log.entry(key.to_string()).or_default();
        let live = Self::drop_expired(&mut entry, now - self.window);

        if live < self.max_requests {
            entry.push_back(now);
            (true, self.max_requests - live - 1)
        } else {
            (false, 0)
        }
    }

    /// Slots left in the window for `key`, without recording a request.
    pub fn remaining(&self, key: &str) -> u64 {
        let mut entry = self.log.entry(key.to_string()).or_default();
        let live = Self::drop_expired(&mut entry, Instant::now() - self.window);
        self.max_requests.saturating_sub(live)
    }

    /// Prune timestamps older than `cutoff`; returns how many remain.
    fn drop_expired(timestamps: &mut VecDeque<Instant>, cutoff: Instant) -> u64 {
        while timestamps.front().is_some_and(|t| *t < cutoff) {
            timestamps.pop_front();
        }
        timestamps.len() as u64
    }

    /// Forgets everything recorded for `key`.
    pub fn reset(&self, key: &str) {
        self.log.remove(key);
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
