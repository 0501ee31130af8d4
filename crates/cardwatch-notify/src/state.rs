//! In-memory notification-state engine.
//!
//! Holds the `{lastNotified, lastPrice, wasAvailable}` truth table per
//! `(user, product, shop)`. Preloaded from the database at cycle start,
//! mutated exclusively by the dispatcher during the cycle, and flushed as a
//! batch of dirty entries at cycle end. Between cycles the in-memory view is
//! authoritative.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use cardwatch_core::ProductResult;
use cardwatch_db::{NotificationStateRow, StateUpsert};

/// Composite key `{userId}:{productId}:{shopId}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateKey {
    pub user_id: String,
    pub product_id: String,
    pub shop_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateEntry {
    pub last_notified: Option<DateTime<Utc>>,
    pub last_price: Option<Decimal>,
    pub was_available: bool,
}

#[derive(Debug, Default)]
pub struct NotificationStateEngine {
    entries: HashMap<StateKey, StateEntry>,
    dirty: HashSet<StateKey>,
}

impl NotificationStateEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs persisted rows, overwriting any in-memory entry for the same
    /// key. Entries for other keys survive untouched.
    pub fn preload(&mut self, rows: Vec<NotificationStateRow>) {
        for row in rows {
            let key = StateKey {
                user_id: row.user_id,
                product_id: row.product_id,
                shop_id: row.shop_id,
            };
            self.dirty.remove(&key);
            self.entries.insert(
                key,
                StateEntry {
                    last_notified: row.last_notified,
                    last_price: row.last_price,
                    was_available: row.was_available,
                },
            );
        }
    }

    /// The notify decision: available, within budget, and either first
    /// sighting, a restock edge, or a strict price drop. Equal-price
    /// re-appearances never trigger.
    #[must_use]
    pub fn should_notify(
        &self,
        key: &StateKey,
        result: &ProductResult,
        user_max_price: Decimal,
    ) -> bool {
        if !result.is_available {
            return false;
        }
        let Some(price) = result.price else {
            return false;
        };
        if price > user_max_price {
            return false;
        }

        match self.entries.get(key) {
            None => true,
            Some(entry) => {
                !entry.was_available || entry.last_price.is_some_and(|last| price < last)
            }
        }
    }

    /// Captures the observation into tracked state regardless of the notify
    /// decision. Returns the prior entry so a failed delivery can roll the
    /// key back (state must not advance past an undelivered alert).
    pub fn update_tracked_state(
        &mut self,
        key: &StateKey,
        result: &ProductResult,
    ) -> Option<StateEntry> {
        let prior = self.entries.get(key).cloned();
        let entry = self.entries.entry(key.clone()).or_insert(StateEntry {
            last_notified: None,
            last_price: None,
            was_available: false,
        });
        entry.was_available = result.is_available;
        entry.last_price = result.price;
        self.dirty.insert(key.clone());
        prior
    }

    /// Records a successful delivery.
    pub fn mark_notified(&mut self, key: &StateKey, price: Decimal, now: DateTime<Utc>) {
        let entry = self.entries.entry(key.clone()).or_insert(StateEntry {
            last_notified: None,
            last_price: None,
            was_available: true,
        });
        entry.last_notified = Some(now);
        entry.last_price = Some(price);
        entry.was_available = true;
        self.dirty.insert(key.clone());
    }

    /// Reverts a key to its pre-cycle snapshot after a failed delivery, so
    /// the flush does not persist an advanced state and the next cycle's
    /// `should_notify` still holds.
    pub fn restore(&mut self, key: &StateKey, prior: Option<StateEntry>) {
        match prior {
            Some(entry) => {
                self.entries.insert(key.clone(), entry);
            }
            None => {
                self.entries.remove(key);
            }
        }
        self.dirty.remove(key);
    }

    /// Drains the dirty set into a persistable batch.
    pub fn take_dirty(&mut self) -> Vec<StateUpsert> {
        let mut batch: Vec<StateUpsert> = self
            .dirty
            .drain()
            .filter_map(|key| {
                self.entries.get(&key).map(|entry| StateUpsert {
                    user_id: key.user_id.clone(),
                    product_id: key.product_id.clone(),
                    shop_id: key.shop_id.clone(),
                    last_notified: entry.last_notified,
                    last_price: entry.last_price,
                    was_available: entry.was_available,
                })
            })
            .collect();
        // Deterministic write order keeps the batch transaction deadlock-free
        // against concurrent writers.
        batch.sort_by(|a, b| {
            (&a.user_id, &a.product_id, &a.shop_id).cmp(&(&b.user_id, &b.product_id, &b.shop_id))
        });
        batch
    }

    #[must_use]
    pub fn entry(&self, key: &StateKey) -> Option<&StateEntry> {
        self.entries.get(key)
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
