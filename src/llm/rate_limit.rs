//! Token-bucket limiter for model calls.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::RateLimitConfig;

/// Bucket state. Pure bookkeeping; time is always passed in.
#[derive(Debug)]
struct Bucket {
    capacity: f64,
    tokens: f64,
    /// Tokens added per second.
    refill_rate: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: u32, window: Duration, now: Instant) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            tokens: capacity,
            refill_rate: capacity / window.as_secs_f64().max(f64::EPSILON),
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Take one token, or report how long until one is available.
    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_rate))
        }
    }
}

/// Allows `capacity` requests immediately, then drains at
/// `capacity / window` requests per second.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            bucket: Mutex::new(Bucket::new(
                config.requests,
                Duration::from_secs(config.window_secs),
                Instant::now(),
            )),
        }
    }

    /// Wait until a request may be issued, then consume the allowance.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                match bucket.try_take(Instant::now()) {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };
            tracing::info!("Rate limit reached, waiting {:.1}s before next model call", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }
    }
}
