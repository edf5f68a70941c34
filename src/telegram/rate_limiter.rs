//! Spacing of outgoing Telegram messages.
//!
//! Bursts of violations would otherwise hit the Bot API flood limits.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Enforces a minimum interval between sends.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,

    /// Earliest moment the next send may start.
    next_allowed: Mutex<Option<Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_allowed: Mutex::const_new(None),
        }
    }

    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Waits for the next send slot and claims it.
    ///
    /// Returns how long the caller was held back.
    pub async fn acquire(&self) -> Duration {
        let mut next = self.next_allowed.lock().await;

        let wait = next.map_or(Duration::ZERO, |at| at.saturating_duration_since(Instant::now()));
        if !wait.is_zero() {
            debug!("Delaying Telegram send by {:?}", wait);
            tokio::time::sleep(wait).await;
        }

        *next = Some(Instant::now() + self.min_interval);
        wait
    }

    /// Pushes the next slot back after Telegram answered with `RetryAfter`.
    pub async fn retry_after(&self, delay: Duration) {
        warn!("Telegram asked to retry after {} s", delay.as_secs());

        let mut next = self.next_allowed.lock().await;
        let until = Instant::now() + delay;
        if next.is_none_or(|at| at < until) {
            *next = Some(until);
        }
    }

    /// Time left until a send would go through immediately.
    pub async fn time_until_allowed(&self) -> Duration {
        let next = self.next_allowed.lock().await;
        next.map_or(Duration::ZERO, |at| at.saturating_duration_since(Instant::now()))
    }
}
