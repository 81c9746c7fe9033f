//! Minimum-interval rate limiting for external APIs
//!
//! Both the metadata provider and the legacy fallback API require a minimum
//! delay between consecutive calls. A single [`RateLimiter`] is shared behind
//! a `tokio::sync::Mutex` so concurrent tasks queue on it and are released
//! one interval apart.

use bridge_traits::time::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

/// Enforces a minimum delay between requests
pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    last_request_ms: Option<i64>,
    min_delay: Duration,
}

impl RateLimiter {
    pub fn new(delay_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last_request_ms: None,
            min_delay: Duration::from_millis(delay_ms),
        }
    }

    /// Convenience constructor for the shared form used by API clients
    pub fn shared(delay_ms: u64, clock: Arc<dyn Clock>) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::new(delay_ms, clock)))
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Time still to wait before the next request may go out
    pub fn remaining(&self) -> Duration {
        match self.last_request_ms {
            Some(last) => {
                let elapsed_ms = self.clock.unix_timestamp_millis() - last;
                let required_ms = self.min_delay.as_millis() as i64;
                if elapsed_ms < required_ms {
                    Duration::from_millis((required_ms - elapsed_ms.max(0)) as u64)
                } else {
                    Duration::ZERO
                }
            }
            None => Duration::ZERO,
        }
    }

    /// Sleeps until the minimum interval since the previous request elapsed,
    /// then records the current request.
    pub async fn wait_if_needed(&mut self) {
        let wait_time = self.remaining();
        if !wait_time.is_zero() {
            debug!("Rate limiting: waiting {:?}", wait_time);
            sleep(wait_time).await;
        }
        self.last_request_ms = Some(self.clock.unix_timestamp_millis());
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("last_request_ms", &self.last_request_ms)
            .field("min_delay", &self.min_delay)
            .finish()
    }
}
