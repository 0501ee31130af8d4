//! Token-bucket limiter for notification flushes.
//!
//! Capacity equals the flush batch size and the bucket refills in full every
//! batch interval, so acquiring tokens batch-by-batch yields temporally
//! separated batches under the global per-channel send envelope.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

struct BucketState {
    tokens: usize,
    last_refill: Instant,
}

pub struct RateLimiter {
    capacity: usize,
    interval: Duration,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(capacity: usize, interval: Duration) -> Self {
        RateLimiter {
            capacity: capacity.max(1),
            interval,
            state: Mutex::new(BucketState {
                tokens: capacity.max(1),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Blocks until `n` tokens are available, then takes them.
    ///
    /// Requests larger than the capacity are clamped so they cannot deadlock.
    pub async fn acquire(&self, n: usize) {
        let n = n.clamp(1, self.capacity);
        loop {
            let wait_until = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                if now.duration_since(state.last_refill) >= self.interval {
                    state.tokens = self.capacity;
                    state.last_refill = now;
                }
                if state.tokens >= n {
                    state.tokens -= n;
                    return;
                }
                state.last_refill + self.interval
            };
            tokio::time::sleep_until(wait_until).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn full_bucket_grants_immediately() {
        let limiter = RateLimiter::new(25, Duration::from_millis(1100));
        let before = Instant::now();
        limiter.acquire(25).await;
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_bucket_blocks_until_refill() {
        let limiter = RateLimiter::new(25, Duration::from_millis(1100));
        limiter.acquire(25).await;

        let before = Instant::now();
        limiter.acquire(25).await;
        let waited = Instant::now().duration_since(before);
        assert!(
            waited >= Duration::from_millis(1100),
            "waited only {waited:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn partial_takes_accumulate() {
        let limiter = RateLimiter::new(10, Duration::from_millis(1100));
        limiter.acquire(4).await;
        limiter.acquire(6).await;

        let before = Instant::now();
        limiter.acquire(1).await;
        assert!(Instant::now().duration_since(before) >= Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_request_is_clamped() {
        let limiter = RateLimiter::new(5, Duration::from_millis(100));
        // Must not deadlock.
        limiter.acquire(50).await;
    }
}
