//! Fixed-window rate limiter keyed by client address.
//!
//! Each client gets `max_requests` per window; the window starts on the client's first request
//! and resets once it has elapsed. Requests without a known address share one bucket.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Expired windows are swept once the table grows past this many clients.
const SWEEP_THRESHOLD: usize = 10_000;

/// Result of consuming one request from a client's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Time until the current window resets.
    pub reset: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u64,
}

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u64,
    window: Duration,
    clients: Mutex<HashMap<Option<IpAddr>, Window>>,
}

impl RateLimiter {
    pub fn new(max_requests: u64, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> u64 {
        self.max_requests
    }

    /// Consume one request for `client`.
    pub fn check(&self, client: Option<IpAddr>) -> Decision {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: Option<IpAddr>, now: Instant) -> Decision {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if clients.len() > SWEEP_THRESHOLD {
            let window = self.window;
            clients.retain(|_, w| now.saturating_duration_since(w.started) < window);
        }
        let entry = clients.entry(client).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.saturating_duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }
        let allowed = entry.count < self.max_requests;
        if allowed {
            entry.count += 1;
        }
        Decision {
            allowed,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(entry.count),
            reset: self
                .window
                .saturating_sub(now.saturating_duration_since(entry.started)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> Option<IpAddr> {
        Some(IpAddr::from([10, 0, 0, last]))
    }

    #[test]
    fn blocks_after_limit_within_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let t0 = Instant::now();
        let first = limiter.check_at(ip(1), t0);
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);
        assert!(limiter.check_at(ip(1), t0).allowed);
        let third = limiter.check_at(ip(1), t0 + Duration::from_secs(10));
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);
        assert_eq!(third.reset, Duration::from_secs(50));
    }

    #[test]
    fn window_resets_after_expiry() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(limiter.check_at(ip(1), t0).allowed);
        assert!(!limiter.check_at(ip(1), t0 + Duration::from_secs(59)).allowed);
        assert!(limiter.check_at(ip(1), t0 + Duration::from_secs(60)).allowed);
    }

    #[test]
    fn clients_are_independent_and_unknown_share_a_bucket() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(limiter.check_at(ip(1), t0).allowed);
        assert!(limiter.check_at(ip(2), t0).allowed);
        assert!(limiter.check_at(None, t0).allowed);
        assert!(!limiter.check_at(None, t0).allowed);
    }
}
