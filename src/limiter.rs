use crate::config::{BucketConfig, RateLimitConfig};
use crate::connector::Retailer;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Token bucket for one retailer. Tokens accrue fractionally so a slow
/// refill interval never rounds away progress.
struct Bucket {
    capacity: f64,
    tokens: f64,
    refill_interval: Duration,
    last_refill: Instant,
}

impl Bucket {
    fn new(config: &BucketConfig) -> Self {
        let capacity = f64::from(config.capacity.max(1));
        Self {
            capacity,
            tokens: capacity,
            refill_interval: Duration::from_millis(config.refill_ms.max(1)),
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let gained = elapsed.as_secs_f64() / self.refill_interval.as_secs_f64();
        if gained > 0.0 {
            self.tokens = (self.tokens + gained).min(self.capacity);
            self.last_refill = now;
        }
    }

    /// Take one token, or report how long until one is available.
    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(
                missing * self.refill_interval.as_secs_f64(),
            ))
        }
    }
}

/// Process-wide rate limiter registry, one bucket per retailer, shared
/// by every executor targeting that retailer. State is process-local
/// and never persisted.
pub struct RateLimiter {
    buckets: HashMap<Retailer, Mutex<Bucket>>,
}

impl RateLimiter {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let all = [
            Retailer::Ozon,
            Retailer::Wildberries,
            Retailer::VkusVill,
            Retailer::Perekrestok,
            Retailer::YandexLavka,
        ];
        let buckets = all
            .into_iter()
            .map(|retailer| {
                let bucket_config = config
                    .per_retailer
                    .get(retailer.code())
                    .unwrap_or(&config.default);
                (retailer, Mutex::new(Bucket::new(bucket_config)))
            })
            .collect();
        Self { buckets }
    }

    /// Acquire a request slot for the retailer, waiting at most `timeout`.
    /// Returns false on timeout; callers convert that into a transient
    /// failure instead of blocking a worker indefinitely.
    pub async fn acquire(&self, retailer: Retailer, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let bucket = self
            .buckets
            .get(&retailer)
            .expect("bucket exists for every retailer");

        loop {
            let wait = {
                let mut guard = bucket.lock().await;
                match guard.try_take(Instant::now()) {
                    Ok(()) => return true,
                    Err(wait) => wait,
                }
            };

            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            sleep(wait.min(deadline - now)).await;
        }
    }
}
