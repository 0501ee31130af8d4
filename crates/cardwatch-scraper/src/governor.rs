//! Per-shop anti-bot governor: concurrency cap, request jitter, proxy policy.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use cardwatch_core::AntiBot;

use crate::error::ScrapeError;

/// Relative jitter applied to a shop's request delay: the actual sleep is
/// uniformly drawn from `delay * (1 ± JITTER)`.
const JITTER: f64 = 0.3;

pub struct ShopGovernor {
    semaphore: Arc<Semaphore>,
    request_delay_ms: Option<u64>,
    use_proxy: bool,
}

impl ShopGovernor {
    /// Builds a governor from a shop's `antiBot` block. Missing values fall
    /// back to the process-wide defaults; proxy routing requires BOTH the
    /// global switch and the shop flag.
    #[must_use]
    pub fn new(anti_bot: &AntiBot, default_concurrency: usize, proxy_globally_enabled: bool) -> Self {
        let permits = anti_bot.max_concurrency.unwrap_or(default_concurrency).max(1);
        ShopGovernor {
            semaphore: Arc::new(Semaphore::new(permits)),
            request_delay_ms: anti_bot.request_delay_ms,
            use_proxy: proxy_globally_enabled && anti_bot.use_proxy,
        }
    }

    /// Waits for a concurrency slot; the permit is released on drop.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Closed`] only if the semaphore has been closed,
    /// which does not happen during normal operation.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, ScrapeError> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| ScrapeError::Closed)
    }

    /// Sleeps the jittered request delay before an outbound navigation.
    pub async fn pace(&self) {
        if let Some(delay_ms) = self.request_delay_ms {
            let jittered = jittered_delay_ms(delay_ms);
            if jittered > 0 {
                tokio::time::sleep(Duration::from_millis(jittered)).await;
            }
        }
    }

    /// Whether engines for this shop must route through the rotating proxy.
    #[must_use]
    pub fn use_proxy(&self) -> bool {
        self.use_proxy
    }

    /// Free permits right now; used by tests and cycle diagnostics.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

fn jittered_delay_ms(delay_ms: u64) -> u64 {
    if delay_ms == 0 {
        return 0;
    }
    let factor = rand::rng().random_range((1.0 - JITTER)..=(1.0 + JITTER));
    // Delays are configured in whole milliseconds well below 2^52, so the
    // f64 round-trip is exact for any realistic config.
    (delay_ms as f64 * factor).round() as u64
}
