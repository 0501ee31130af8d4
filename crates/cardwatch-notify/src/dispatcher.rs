//! Multi-user fan-out dispatcher.
//!
//! Lifecycle per cycle: empty → populated by [`Dispatcher::preload_for_cycle`]
//! → fed by [`Dispatcher::process_result`] (zero database calls) → drained by
//! [`Dispatcher::flush_notifications`] → state deltas persisted by
//! [`Dispatcher::persist_state`]. The dispatcher exclusively owns the
//! in-memory notification state and the message queue; the cycle driver
//! persists the audit records the flush hands back.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;

use cardwatch_core::{ProductResult, ResolvedProduct, ShopConfig};
use cardwatch_db::{
    get_active_watchers_by_product_ids, get_notification_targets, load_notification_states,
    upsert_notification_states, Channel, DbError, DeliveryRecord, NewNotification,
    NotificationTarget, Watcher,
};

use crate::channel::{ChannelAdapter, NotificationPayload};
use crate::limiter::RateLimiter;
use crate::state::{NotificationStateEngine, StateEntry, StateKey};

/// Flush pacing knobs; defaults satisfy the ≤30 msg/s per-channel envelope.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    pub batch_size: usize,
    pub batch_delay: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            batch_size: 25,
            batch_delay: Duration::from_millis(1100),
        }
    }
}

/// Counts from one queue drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub sent: usize,
    pub failed: usize,
}

/// One queued alert: everything needed to deliver without touching the
/// database, plus the state snapshot to roll back to on failure.
struct QueuedNotification {
    user_id: String,
    targets: Vec<NotificationTarget>,
    payload: NotificationPayload,
    state_key: StateKey,
    prior_state: Option<StateEntry>,
}

/// Outcome of delivering one queued alert to all of its targets.
struct MessageOutcome {
    message: QueuedNotification,
    any_success: bool,
    deliveries: Vec<DeliveryRecord>,
}

pub struct Dispatcher {
    adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
    config: DispatcherConfig,
    state: NotificationStateEngine,
    watchers: HashMap<String, Vec<Watcher>>,
    targets: HashMap<String, Vec<NotificationTarget>>,
    queue: Vec<QueuedNotification>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
        config: DispatcherConfig,
    ) -> Self {
        Dispatcher {
            adapters,
            config,
            state: NotificationStateEngine::new(),
            watchers: HashMap::new(),
            targets: HashMap::new(),
            queue: Vec::new(),
        }
    }

    /// Preloads watchers, channel targets, and notification state for the
    /// cycle in three round-trips total. Returns the products with at least
    /// one subscriber, so the scheduler may elide unwatched scrapes.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if any preload query fails.
    pub async fn preload_for_cycle(
        &mut self,
        pool: &PgPool,
        product_ids: &[String],
    ) -> Result<HashSet<String>, DbError> {
        let watchers = get_active_watchers_by_product_ids(pool, product_ids).await?;

        let mut user_ids: Vec<String> = watchers
            .values()
            .flatten()
            .map(|watcher| watcher.user_id.clone())
            .collect();
        user_ids.sort();
        user_ids.dedup();
        let targets = get_notification_targets(pool, &user_ids).await?;

        self.state
            .preload(load_notification_states(pool, product_ids).await?);

        tracing::debug!(
            products = watchers.len(),
            users = user_ids.len(),
            linked_users = targets.len(),
            "dispatcher: preloaded cycle state"
        );
        self.install_cycle_data(watchers, targets);
        Ok(self.watchers.keys().cloned().collect())
    }

    /// Installs the per-cycle watcher and target maps. Exposed separately
    /// from [`Dispatcher::preload_for_cycle`] so the maps can come from any
    /// source (tests use it directly).
    pub fn install_cycle_data(
        &mut self,
        watchers: HashMap<String, Vec<Watcher>>,
        targets: HashMap<String, Vec<NotificationTarget>>,
    ) {
        self.watchers = watchers;
        self.targets = targets;
    }

    /// Routes one observation to every watcher of the product. Tracked state
    /// is updated unconditionally; an alert is queued only for watchers with
    /// a linked channel, a buyable in-budget offer, and a passing
    /// notification edge. No database calls happen here.
    pub fn process_result(
        &mut self,
        product: &ResolvedProduct,
        shop: &ShopConfig,
        result: &ProductResult,
    ) {
        let Some(watchers) = self.watchers.get(&product.product.id) else {
            return;
        };

        for watcher in watchers.clone() {
            let key = StateKey {
                user_id: watcher.user_id.clone(),
                product_id: product.product.id.clone(),
                shop_id: shop.id.clone(),
            };
            let notify = self.state.should_notify(&key, result, watcher.max_price);
            let prior_state = self.state.update_tracked_state(&key, result);

            if !notify {
                continue;
            }
            let Some(targets) = self.targets.get(&watcher.user_id) else {
                // No linked channel: tracked, never queued.
                continue;
            };
            let Some(price) = result.price else {
                continue;
            };

            self.queue.push(QueuedNotification {
                user_id: watcher.user_id.clone(),
                targets: targets.clone(),
                payload: NotificationPayload {
                    product_id: product.product.id.clone(),
                    product_name: product.product.name.clone(),
                    shop_id: shop.id.clone(),
                    shop_name: shop.name.clone(),
                    price,
                    max_price: watcher.max_price,
                    product_url: result.product_url.clone(),
                },
                state_key: key,
                prior_state,
            });
        }
    }

    /// Queue length, for the scheduler's backpressure check.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Drains the queue exactly once: batches of `batch_size`, paced by the
    /// token bucket so consecutive batches are at least `batch_delay` apart.
    /// Messages within a batch go out concurrently, except that one user's
    /// messages are always sequential. Successful deliveries advance state;
    /// failures roll it back so the next cycle retries.
    ///
    /// Returns the summary plus one audit record per message for the cycle
    /// driver to persist.
    pub async fn flush_notifications(&mut self) -> (FlushSummary, Vec<NewNotification>) {
        let mut queue = std::mem::take(&mut self.queue);
        let mut summary = FlushSummary::default();
        let mut audits = Vec::with_capacity(queue.len());
        if queue.is_empty() {
            self.end_cycle();
            return (summary, audits);
        }

        tracing::info!(queued = queue.len(), "dispatcher: flushing notifications");
        let limiter = RateLimiter::new(self.config.batch_size, self.config.batch_delay);
        let adapters = self.adapters.clone();

        while !queue.is_empty() {
            let take = queue.len().min(self.config.batch_size);
            let batch: Vec<QueuedNotification> = queue.drain(..take).collect();
            limiter.acquire(batch.len()).await;

            for outcome in send_batch(&adapters, batch).await {
                audits.push(self.settle(outcome, &mut summary));
            }
        }

        self.end_cycle();
        tracing::info!(
            sent = summary.sent,
            failed = summary.failed,
            "dispatcher: flush complete"
        );
        (summary, audits)
    }

    /// Persists the cycle's dirty notification-state entries in one batch.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the batch write fails; the next cycle
    /// re-observes the same conditions, so nothing is lost beyond one tick.
    pub async fn persist_state(&mut self, pool: &PgPool) -> Result<usize, DbError> {
        let batch = self.state.take_dirty();
        let count = batch.len();
        upsert_notification_states(pool, &batch).await?;
        Ok(count)
    }

    /// Applies one delivery outcome — state advance or rollback — and shapes
    /// the audit record.
    fn settle(&mut self, outcome: MessageOutcome, summary: &mut FlushSummary) -> NewNotification {
        let message = outcome.message;
        if outcome.any_success {
            summary.sent += 1;
            self.state
                .mark_notified(&message.state_key, message.payload.price, Utc::now());
        } else {
            summary.failed += 1;
            tracing::warn!(
                user = %message.user_id,
                product = %message.payload.product_id,
                shop = %message.payload.shop_id,
                "dispatcher: delivery failed; state not advanced"
            );
            self.state.restore(&message.state_key, message.prior_state);
        }

        NewNotification {
            user_id: message.user_id,
            status: if outcome.any_success { "sent" } else { "failed" },
            payload: serde_json::to_value(&message.payload).unwrap_or_default(),
            deliveries: outcome.deliveries,
        }
    }

    /// Clears the per-cycle maps. Notification state survives in memory; it
    /// is the authoritative view between cycles.
    fn end_cycle(&mut self) {
        self.watchers.clear();
        self.targets.clear();
    }

    /// Read access for the cycle driver's summary logging and for tests.
    #[must_use]
    pub fn state(&self) -> &NotificationStateEngine {
        &self.state
    }
}

/// Sends one batch: users in parallel, one user's messages in sequence.
async fn send_batch(
    adapters: &HashMap<Channel, Arc<dyn ChannelAdapter>>,
    batch: Vec<QueuedNotification>,
) -> Vec<MessageOutcome> {
    let mut by_user: HashMap<String, Vec<QueuedNotification>> = HashMap::new();
    for message in batch {
        by_user
            .entry(message.user_id.clone())
            .or_default()
            .push(message);
    }

    let per_user = by_user
        .into_values()
        .map(|messages| send_user_messages(adapters, messages));
    futures::future::join_all(per_user)
        .await
        .into_iter()
        .flatten()
        .collect()
}

async fn send_user_messages(
    adapters: &HashMap<Channel, Arc<dyn ChannelAdapter>>,
    messages: Vec<QueuedNotification>,
) -> Vec<MessageOutcome> {
    let mut outcomes = Vec::with_capacity(messages.len());
    for message in messages {
        let mut deliveries = Vec::with_capacity(message.targets.len());
        let mut any_success = false;

        for target in &message.targets {
            let Some(adapter) = adapters.get(&target.channel) else {
                deliveries.push(DeliveryRecord {
                    channel: target.channel,
                    channel_target: target.channel_target.clone(),
                    status: "failed",
                    attempts: 0,
                    error: Some("no adapter configured for channel".to_string()),
                    sent_at: None,
                });
                continue;
            };

            match adapter.send(&target.channel_target, &message.payload).await {
                Ok(()) => {
                    any_success = true;
                    deliveries.push(DeliveryRecord {
                        channel: target.channel,
                        channel_target: target.channel_target.clone(),
                        status: "sent",
                        attempts: 1,
                        error: None,
                        sent_at: Some(Utc::now()),
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        channel = %target.channel,
                        error = %e,
                        "dispatcher: channel send failed"
                    );
                    deliveries.push(DeliveryRecord {
                        channel: target.channel,
                        channel_target: target.channel_target.clone(),
                        status: "failed",
                        attempts: 1,
                        error: Some(e.to_string()),
                        sent_at: None,
                    });
                }
            }
        }

        outcomes.push(MessageOutcome {
            message,
            any_success,
            deliveries,
        });
    }
    outcomes
}

#[cfg(test)]
#[path = "dispatcher_test.rs"]
mod tests;
