//! Time Abstraction
//!
//! Provides an injectable time source so rate limiting and record timestamps
//! can be driven deterministically in tests.

use chrono::{DateTime, Utc};

/// Wall clock seen by the rate limiters and the run summary
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Seconds since the epoch
    fn unix_timestamp(&self) -> i64 {
        self.now().timestamp()
    }

    /// Milliseconds since the epoch, the resolution rate limits work in
    fn unix_timestamp_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// `Utc::now()`
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
