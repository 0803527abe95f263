//! Shared remote call rate limiter.
//!
//! One limiter is built per run and handed to every worker as an
//! `Arc<RateLimiter>`. Consecutive grants, across all workers, are at least
//! `min_interval` apart: for N grants the elapsed time is at least
//! `(N - 1) * min_interval`.

use core_runtime::config::RateLimitConfig;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

#[derive(Debug)]
struct LimiterState {
    last_granted: Option<Instant>,
    granted: u64,
}

#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            state: Mutex::new(LimiterState {
                last_granted: None,
                granted: 0,
            }),
        }
    }

    /// At most `config.calls` grants per `config.interval`.
    pub fn from_rate(config: &RateLimitConfig) -> Self {
        Self::new(config.min_interval())
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for the next slot and claim it.
    ///
    /// The state lock is held across the wait, so waiters are granted one at
    /// a time in lock order and the new timestamp is recorded before the
    /// next waiter looks at it.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;

        if let Some(last) = state.last_granted {
            let ready_at = last + self.min_interval;
            if Instant::now() < ready_at {
                trace!(wait_ms = (ready_at - Instant::now()).as_millis() as u64, "Rate limiting");
                sleep_until(ready_at).await;
            }
        }

        state.last_granted = Some(Instant::now());
        state.granted += 1;
    }

    /// Number of grants so far.
    pub async fn granted(&self) -> u64 {
        self.state.lock().await.granted
    }
}
