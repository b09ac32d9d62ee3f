//! Clock-offset tracking.
//!
//! The server rejects keys whose timestamp is too far from its own clock.
//! Instead of trusting the device clock, every key is stamped with
//! `local_now + offset`, where the offset is recomputed each time the
//! server reports its time.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::protocol::{header_str, HeaderMap, DATE_HEADER, TIMESTAMP_HEADER};
use crate::storage::AuthStore;

/// Source of local wall-clock time.
pub trait WallClock: Send + Sync {
    /// Seconds since the Unix epoch, with sub-second precision.
    fn now_seconds(&self) -> f64;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now_seconds(&self) -> f64 {
        let now = Utc::now();
        now.timestamp() as f64 + f64::from(now.timestamp_subsec_nanos()) / 1_000_000_000.0
    }
}

/// Process-wide clock offset, persisted through the auth store.
pub struct ClockTracker {
    /// Current offset in seconds; the lock also orders observations.
    offset: Mutex<f64>,
    store: Arc<dyn AuthStore>,
    clock: Arc<dyn WallClock>,
}

impl ClockTracker {
    /// Create a tracker seeded with the persisted offset.
    pub fn new(store: Arc<dyn AuthStore>, clock: Arc<dyn WallClock>) -> Self {
        let offset = store.clock_offset();
        let offset = if offset.is_finite() { offset } else { 0.0 };
        Self {
            offset: Mutex::new(offset),
            store,
            clock,
        }
    }

    pub fn offset(&self) -> f64 {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Local time corrected by the current offset, in seconds.
    pub fn authenticated_now(&self) -> f64 {
        self.clock.now_seconds() + self.offset()
    }

    /// Apply a server time given as milliseconds since the epoch.
    ///
    /// Returns the new offset, or `None` if the value could not be parsed
    /// (the previous offset is kept).
    pub fn observe_server_time(&self, server_time_millis: &str) -> Option<f64> {
        match server_time_millis.trim().parse::<f64>() {
            Ok(millis) if millis.is_finite() => Some(self.observe_server_millis(millis)),
            _ => {
                warn!(value = %server_time_millis, "Ignoring unparseable server time");
                None
            }
        }
    }

    /// Apply a server time given as an RFC 2822 HTTP date.
    ///
    /// HTTP dates only have whole-second precision.
    pub fn observe_http_date(&self, date: &str) -> Option<f64> {
        match DateTime::parse_from_rfc2822(date.trim()) {
            Ok(parsed) => Some(self.observe_server_millis(parsed.timestamp_millis() as f64)),
            Err(e) => {
                warn!(value = %date, error = %e, "Ignoring unparseable server date");
                None
            }
        }
    }

    /// Apply the `Timestamp` header of a response, if present.
    pub fn observe_headers(&self, headers: &HeaderMap) -> Option<f64> {
        header_str(headers, &TIMESTAMP_HEADER).and_then(|value| self.observe_server_time(value))
    }

    /// Apply the `Timestamp` header, falling back to `Date`.
    pub fn observe_headers_or_date(&self, headers: &HeaderMap) -> Option<f64> {
        if let Some(offset) = self.observe_headers(headers) {
            return Some(offset);
        }
        header_str(headers, &DATE_HEADER).and_then(|value| self.observe_http_date(value))
    }

    /// Recompute the offset from a server time in milliseconds.
    ///
    /// Observations are applied in the order they acquire the lock; the
    /// latest one always wins.
    pub fn observe_server_millis(&self, millis: f64) -> f64 {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        let next = millis / 1000.0 - self.clock.now_seconds();
        *offset = next;

        if let Err(e) = self.store.set_clock_offset(next) {
            warn!(error = %e, "Failed to persist clock offset");
        }

        debug!(offset_seconds = next, "Clock offset updated from server time");
        next
    }
}
