//! Call spacing for remote resources.
//!
//! One [`RateLimiter`] guards one resource (the metadata API, image
//! downloads). Callers across all queues share it, so it is the only point
//! where otherwise independent queues wait on each other.

use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Intervals for a single limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Minimum time between two permitted calls.
    pub interval: Duration,
    /// Minimum time used by [`RateLimiter::ensure_short_rate`].
    pub short_interval: Duration,
}

impl RateLimiterConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            short_interval: interval,
        }
    }

    pub fn with_short_interval(mut self, short_interval: Duration) -> Self {
        self.short_interval = short_interval;
        self
    }
}

pub struct RateLimiter {
    name: &'static str,
    config: RateLimiterConfig,
    /// Serializes callers, held while waiting.
    gate: Mutex<()>,
    /// Time of the last permitted call.
    last_call: StdMutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(name: &'static str, config: RateLimiterConfig) -> Self {
        Self {
            name,
            config,
            gate: Mutex::new(()),
            last_call: StdMutex::new(None),
        }
    }

    /// Waits until the full interval has passed since the last permitted
    /// call, then records the current time.
    pub async fn ensure_rate(&self) {
        self.wait_for(self.config.interval).await
    }

    /// Same as [`RateLimiter::ensure_rate`] for lightweight calls, using the
    /// short interval.
    pub async fn ensure_short_rate(&self) {
        self.wait_for(self.config.short_interval).await
    }

    /// Forgets the last call so the next caller proceeds immediately.
    pub fn reset(&self) {
        *self.lock_last_call() = None;
        debug!("Rate limiter '{}' reset", self.name);
    }

    async fn wait_for(&self, interval: Duration) {
        let _gate = self.gate.lock().await;

        let last_call = *self.lock_last_call();
        if let Some(last_call) = last_call {
            let ready_at = last_call + interval;
            let now = Instant::now();
            if ready_at > now {
                debug!(
                    "Rate limiter '{}' waiting {:?}",
                    self.name,
                    ready_at - now
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }

        *self.lock_last_call() = Some(Instant::now());
    }

    fn lock_last_call(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        match self.last_call.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
