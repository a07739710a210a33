//! Expiration Module
//!
//! Pairs an absolute expiry instant with the originally requested TTL.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::Serialize;

// == Expiration ==
/// Absolute expiry instant plus the TTL that produced it.
///
/// The zero value (`time == 0.0`, `expiration == 0`) stands for metadata
/// that could not be decoded and is always expired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Expiration {
    /// Expiry instant as Unix seconds with sub-second precision
    time: f64,
    /// Requested TTL in milliseconds
    expiration: u64,
}

impl Expiration {
    // == Constructor ==
    pub fn new(time: f64, expiration: u64) -> Self {
        Self { time, expiration }
    }

    /// Creates an expiration `ttl_ms` milliseconds from now.
    pub fn from_ttl_ms(ttl_ms: u64) -> Self {
        Self::new(current_timestamp() + ttl_ms as f64 / 1000.0, ttl_ms)
    }

    /// Returns the absolute expiry instant in Unix seconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Returns the requested TTL in milliseconds.
    pub fn expiration(&self) -> u64 {
        self.expiration
    }

    // == Is Live ==
    /// An entry stays live while the expiry instant is at or after now.
    pub fn is_live(&self) -> bool {
        self.time >= current_timestamp()
    }

    /// Expiry instant as a UTC timestamp.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let secs = self.time.trunc() as i64;
        let nanos = (self.time.fract() * 1_000_000_000.0) as u32;
        DateTime::from_timestamp(secs, nanos)
    }
}

// == Utility Functions ==
/// Returns current Unix time in seconds with sub-second precision.
pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Converts a TTL to whole milliseconds.
pub fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
}
