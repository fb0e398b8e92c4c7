//! Process-wide request/error counters reported by the health endpoints.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

pub const APP_NAME: &str = "Hookchat";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_DESCRIPTION: &str = "Chat interface that relays messages to any webhook";

/// Most recent recorded error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastError {
    pub message: String,
    pub timestamp: String,
}

/// Counters since process start. Shared behind an `Arc` by the gateway.
#[derive(Debug)]
pub struct ServerStats {
    started: Instant,
    started_at: DateTime<Utc>,
    requests: AtomicU64,
    errors: AtomicU64,
    last_error: Mutex<Option<LastError>>,
}

/// Point-in-time copy of [`ServerStats`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub start_time: DateTime<Utc>,
    pub uptime: u64,
    pub request_count: u64,
    pub error_count: u64,
    pub last_error: Option<LastError>,
    pub requests_per_second: f64,
    /// Percentage of requests that errored, two decimals.
    pub error_rate: f64,
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, message: impl Into<String>) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        let entry = LastError {
            message: message.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(entry);
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let uptime = self.uptime().as_secs();
        let requests = self.requests.load(Ordering::Relaxed);
        let errors = self.errors.load(Ordering::Relaxed);
        StatsSnapshot {
            start_time: self.started_at,
            uptime,
            request_count: requests,
            error_count: errors,
            last_error: self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            requests_per_second: ratio(requests, uptime, 100.0),
            error_rate: ratio(errors * 100, requests, 100.0),
        }
    }

    /// Prometheus text exposition of the counters.
    pub fn prometheus(&self) -> String {
        let s = self.snapshot();
        format!(
            "# HELP app_requests_total Total number of requests\n\
             # TYPE app_requests_total counter\n\
             app_requests_total {}\n\
             \n\
             # HELP app_errors_total Total number of errors\n\
             # TYPE app_errors_total counter\n\
             app_errors_total {}\n\
             \n\
             # HELP app_uptime_seconds Application uptime in seconds\n\
             # TYPE app_uptime_seconds gauge\n\
             app_uptime_seconds {}\n",
            s.request_count, s.error_count, s.uptime
        )
    }
}

/// `num / den` rounded to `1/scale`; zero when `den` is zero.
fn ratio(num: u64, den: u64, scale: f64) -> f64 {
    if den == 0 {
        return 0.0;
    }
    (num as f64 / den as f64 * scale).round() / scale
}
