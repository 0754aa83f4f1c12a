//! Token bucket rate limiter shared by every request of one backend client

use super::config::RateLimitConfig;
use log::debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<Bucket>>,
    config: RateLimitConfig,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
    requests_made: u64,
    requests_delayed: u64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Bucket {
                tokens: config.burst_capacity as f64,
                last_refill: Instant::now(),
                requests_made: 0,
                requests_delayed: 0,
            })),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Bucket> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until a request may be sent
    pub async fn acquire(&self) {
        if !self.config.enabled {
            return;
        }

        loop {
            if self.take_token() {
                return;
            }

            let wait = self.seconds_per_token();
            debug!("Rate limiter: waiting {:?} for next token", wait);
            sleep(wait).await;
        }
    }

    /// Take a token without waiting; false when the bucket is empty
    pub fn try_acquire(&self) -> bool {
        !self.config.enabled || self.take_token()
    }

    fn take_token(&self) -> bool {
        let mut bucket = self.lock();
        self.refill(&mut bucket);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            bucket.requests_made += 1;
            true
        } else {
            bucket.requests_delayed += 1;
            false
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill);
        let tokens_per_second = self.config.requests_per_minute as f64 / 60.0;
        let added = elapsed.as_secs_f64() * tokens_per_second;

        if added > 0.0 {
            bucket.tokens = (bucket.tokens + added).min(self.config.burst_capacity as f64);
            bucket.last_refill = now;
        }
    }

    fn seconds_per_token(&self) -> Duration {
        let rpm = self.config.requests_per_minute.max(1);
        Duration::from_secs_f64(60.0 / rpm as f64)
    }

    pub fn stats(&self) -> RateLimiterStats {
        let bucket = self.lock();
        RateLimiterStats {
            tokens_available: bucket.tokens,
            requests_made: bucket.requests_made,
            requests_delayed: bucket.requests_delayed,
            enabled: self.config.enabled,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiterStats {
    pub tokens_available: f64,
    /// Requests that were granted a token
    pub requests_made: u64,
    /// Attempts that found the bucket empty
    pub requests_delayed: u64,
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_reject() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_minute: 60,
            burst_capacity: 2,
            enabled: true,
        });

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        let stats = limiter.stats();
        assert_eq!(stats.requests_made, 2);
        assert_eq!(stats.requests_delayed, 1);
    }

    #[test]
    fn test_disabled_limiter_never_rejects() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_minute: 1,
            burst_capacity: 0,
            enabled: false,
        });

        for _ in 0..100 {
            assert!(limiter.try_acquire());
        }
    }

    #[tokio::test]
    async fn test_acquire_waits_for_refill() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_minute: 6000, // one token every 10ms
            burst_capacity: 1,
            enabled: true,
        });

        limiter.acquire().await;
        let started = Instant::now();
        limiter.acquire().await;
        assert!(started.elapsed() >= Duration::from_millis(5));
    }
}
