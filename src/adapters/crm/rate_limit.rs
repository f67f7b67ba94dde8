//! Request pacing shared by every entity worker

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum interval between consecutive requests
pub struct RateLimiter {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// `interval = 1 / requests_per_second`
    pub fn per_second(requests_per_second: u32) -> Self {
        Self::new(Duration::from_secs_f64(1.0 / f64::from(requests_per_second.max(1))))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the next request may go out
    ///
    /// The lock is held across the sleep so waiters are released one interval apart.
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}
