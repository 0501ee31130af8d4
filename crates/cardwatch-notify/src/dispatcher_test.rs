use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::time::Instant;

use cardwatch_core::{
    AntiBot, EngineKind, FetchingTier, Product, ProductPageSelectors, SearchPageSelectors,
    Selector, ShopSelectors,
};

use crate::error::NotifyError;

use super::*;

// ---------------------------------------------------------------------------
// Fake channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct RecordedSend {
    channel_target: String,
    product_id: String,
    at: Instant,
}

/// Records every send; targets listed in `fail_targets` are rejected.
struct FakeChannel {
    sends: Arc<Mutex<Vec<RecordedSend>>>,
    fail_targets: Vec<String>,
}

impl FakeChannel {
    fn new() -> (Arc<Self>, Arc<Mutex<Vec<RecordedSend>>>) {
        let sends = Arc::new(Mutex::new(Vec::new()));
        let channel = Arc::new(FakeChannel {
            sends: Arc::clone(&sends),
            fail_targets: Vec::new(),
        });
        (channel, sends)
    }

    fn failing(targets: &[&str]) -> (Arc<Self>, Arc<Mutex<Vec<RecordedSend>>>) {
        let sends = Arc::new(Mutex::new(Vec::new()));
        let channel = Arc::new(FakeChannel {
            sends: Arc::clone(&sends),
            fail_targets: targets.iter().map(ToString::to_string).collect(),
        });
        (channel, sends)
    }
}

#[async_trait]
impl ChannelAdapter for FakeChannel {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn send(
        &self,
        channel_target: &str,
        payload: &NotificationPayload,
    ) -> Result<(), NotifyError> {
        self.sends.lock().unwrap().push(RecordedSend {
            channel_target: channel_target.to_string(),
            product_id: payload.product_id.clone(),
            at: Instant::now(),
        });
        if self.fail_targets.iter().any(|t| t == channel_target) {
            return Err(NotifyError::Delivery {
                channel: "fake",
                channel_target: channel_target.to_string(),
                reason: "rejected by test".to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn shop() -> ShopConfig {
    ShopConfig {
        id: "geekowo".to_string(),
        name: "Geekowo".to_string(),
        base_url: "https://geekowo.pl".to_string(),
        search_url: "https://geekowo.pl/szukaj?q={query}".to_string(),
        engine: EngineKind::StaticHtml,
        fetching_tier: FetchingTier::Fast,
        anti_bot: AntiBot::default(),
        direct_hit_pattern: None,
        skip_product_page: false,
        disabled: false,
        selectors: ShopSelectors {
            search_page: SearchPageSelectors {
                article: Selector::css("div.tile"),
                product_url: Selector::css("a"),
                title: Selector::css("h2"),
                price: None,
                available: None,
                unavailable: None,
            },
            product_page: ProductPageSelectors {
                title: None,
                price: Selector::css("span.price"),
                available: None,
                unavailable: None,
            },
        },
    }
}

fn resolved(product_id: &str) -> ResolvedProduct {
    ResolvedProduct {
        product: Product {
            id: product_id.to_string(),
            name: product_id.replace('-', " "),
            product_set_id: None,
            product_type_id: None,
            search: None,
            max_price: None,
            min_price: None,
            disabled: false,
        },
        phrases: vec![product_id.replace('-', " ")],
        exclude: vec![],
    }
}

fn observation(product_id: &str, price: Option<&str>, is_available: bool) -> ProductResult {
    ProductResult {
        product_id: product_id.to_string(),
        shop_id: "geekowo".to_string(),
        product_url: format!("https://geekowo.pl/p/{product_id}"),
        price: price.map(|p| p.parse().unwrap()),
        is_available,
        timestamp: Utc::now(),
    }
}

fn watcher(user_id: &str, max_price: &str) -> Watcher {
    Watcher {
        user_id: user_id.to_string(),
        max_price: max_price.parse().unwrap(),
    }
}

fn telegram_target(chat_id: &str) -> NotificationTarget {
    NotificationTarget {
        channel: Channel::Telegram,
        channel_target: chat_id.to_string(),
    }
}

fn dispatcher_with(
    adapter: Arc<dyn ChannelAdapter>,
    watchers: HashMap<String, Vec<Watcher>>,
    targets: HashMap<String, Vec<NotificationTarget>>,
) -> Dispatcher {
    let mut adapters: HashMap<Channel, Arc<dyn ChannelAdapter>> = HashMap::new();
    adapters.insert(Channel::Telegram, adapter);
    let mut dispatcher = Dispatcher::new(adapters, DispatcherConfig::default());
    dispatcher.install_cycle_data(watchers, targets);
    dispatcher
}

fn state_key(user_id: &str, product_id: &str) -> StateKey {
    StateKey {
        user_id: user_id.to_string(),
        product_id: product_id.to_string(),
        shop_id: "geekowo".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn only_watchers_within_budget_are_notified() {
    let (channel, sends) = FakeChannel::new();
    let watchers = HashMap::from([(
        "bundle".to_string(),
        vec![watcher("u1", "400"), watcher("u2", "380")],
    )]);
    let targets = HashMap::from([
        ("u1".to_string(), vec![telegram_target("chat-u1")]),
        ("u2".to_string(), vec![telegram_target("chat-u2")]),
    ]);
    let mut dispatcher = dispatcher_with(channel, watchers, targets);

    dispatcher.process_result(&resolved("bundle"), &shop(), &observation("bundle", Some("395.00"), true));
    assert_eq!(dispatcher.queue_len(), 1);

    let (summary, audits) = dispatcher.flush_notifications().await;
    assert_eq!(summary, FlushSummary { sent: 1, failed: 0 });
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].status, "sent");

    let sends = sends.lock().unwrap();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].channel_target, "chat-u1");
}

#[tokio::test(start_paused = true)]
async fn users_without_linked_channel_never_enter_the_queue() {
    let (channel, sends) = FakeChannel::new();
    let watchers = HashMap::from([("bundle".to_string(), vec![watcher("u1", "450")])]);
    // No targets at all.
    let mut dispatcher = dispatcher_with(channel, watchers, HashMap::new());

    let result = observation("bundle", Some("399.00"), true);
    dispatcher.process_result(&resolved("bundle"), &shop(), &result);

    assert_eq!(dispatcher.queue_len(), 0);
    assert!(sends.lock().unwrap().is_empty());
    // Tracked state was still captured.
    let entry = dispatcher.state().entry(&state_key("u1", "bundle")).unwrap();
    assert!(entry.was_available);
    assert_eq!(entry.last_price, Some("399.00".parse::<Decimal>().unwrap()));
}

#[tokio::test(start_paused = true)]
async fn unavailable_result_updates_state_for_all_watchers() {
    let (channel, _) = FakeChannel::new();
    let watchers = HashMap::from([(
        "bundle".to_string(),
        vec![watcher("u1", "450"), watcher("u2", "450")],
    )]);
    let targets = HashMap::from([("u1".to_string(), vec![telegram_target("chat-u1")])]);
    let mut dispatcher = dispatcher_with(channel, watchers, targets);

    dispatcher.process_result(&resolved("bundle"), &shop(), &observation("bundle", None, false));

    assert_eq!(dispatcher.queue_len(), 0);
    for user in ["u1", "u2"] {
        let entry = dispatcher.state().entry(&state_key(user, "bundle")).unwrap();
        assert!(!entry.was_available);
    }
}

#[tokio::test(start_paused = true)]
async fn duplicate_results_across_cycles_notify_once() {
    let (channel, sends) = FakeChannel::new();
    let watchers = HashMap::from([("bundle".to_string(), vec![watcher("u1", "450")])]);
    let targets = HashMap::from([("u1".to_string(), vec![telegram_target("chat-u1")])]);

    let mut dispatcher = dispatcher_with(channel, watchers.clone(), targets.clone());
    dispatcher.process_result(&resolved("bundle"), &shop(), &observation("bundle", Some("399.00"), true));
    dispatcher.flush_notifications().await;

    // Next cycle, same observation.
    dispatcher.install_cycle_data(watchers, targets);
    dispatcher.process_result(&resolved("bundle"), &shop(), &observation("bundle", Some("399.00"), true));
    let (summary, _) = dispatcher.flush_notifications().await;

    assert_eq!(summary, FlushSummary::default());
    assert_eq!(sends.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_delivery_is_retried_next_cycle() {
    let (channel, sends) = FakeChannel::failing(&["chat-u1"]);
    let watchers = HashMap::from([("bundle".to_string(), vec![watcher("u1", "450")])]);
    let targets = HashMap::from([("u1".to_string(), vec![telegram_target("chat-u1")])]);

    let mut dispatcher = dispatcher_with(channel, watchers.clone(), targets.clone());
    dispatcher.process_result(&resolved("bundle"), &shop(), &observation("bundle", Some("399.00"), true));
    let (summary, audits) = dispatcher.flush_notifications().await;
    assert_eq!(summary, FlushSummary { sent: 0, failed: 1 });
    assert_eq!(audits[0].status, "failed");
    assert_eq!(audits[0].deliveries.len(), 1);
    assert_eq!(audits[0].deliveries[0].status, "failed");

    // Same observation next cycle: state did not advance, so it re-queues.
    dispatcher.install_cycle_data(watchers, targets);
    dispatcher.process_result(&resolved("bundle"), &shop(), &observation("bundle", Some("399.00"), true));
    assert_eq!(dispatcher.queue_len(), 1);
    assert_eq!(sends.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn flush_paces_batches_by_token_bucket() {
    let (channel, sends) = FakeChannel::new();
    let mut watchers_for_product = Vec::new();
    let mut targets = HashMap::new();
    for i in 0..60 {
        let user = format!("u{i:02}");
        watchers_for_product.push(watcher(&user, "450"));
        targets.insert(user.clone(), vec![telegram_target(&format!("chat-{user}"))]);
    }
    let watchers = HashMap::from([("bundle".to_string(), watchers_for_product)]);
    let mut dispatcher = dispatcher_with(channel, watchers, targets);

    dispatcher.process_result(&resolved("bundle"), &shop(), &observation("bundle", Some("399.00"), true));
    assert_eq!(dispatcher.queue_len(), 60);

    let (summary, _) = dispatcher.flush_notifications().await;
    assert_eq!(summary, FlushSummary { sent: 60, failed: 0 });

    // 60 messages in batches of 25 → three temporal batches ≥ 1100 ms apart.
    let sends = sends.lock().unwrap();
    let mut batch_times: Vec<Instant> = sends.iter().map(|s| s.at).collect();
    batch_times.sort();
    batch_times.dedup();
    assert!(
        batch_times.len() >= 3,
        "expected ≥3 temporal batches, got {}",
        batch_times.len()
    );
    for pair in batch_times.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(
            gap >= Duration::from_millis(1100),
            "batch gap too small: {gap:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn one_users_messages_are_sequential_and_ordered() {
    let (channel, sends) = FakeChannel::new();
    let watchers = HashMap::from([
        ("bundle-a".to_string(), vec![watcher("u1", "450")]),
        ("bundle-b".to_string(), vec![watcher("u1", "450")]),
    ]);
    let targets = HashMap::from([("u1".to_string(), vec![telegram_target("chat-u1")])]);
    let mut dispatcher = dispatcher_with(channel, watchers, targets);

    dispatcher.process_result(&resolved("bundle-a"), &shop(), &observation("bundle-a", Some("100.00"), true));
    dispatcher.process_result(&resolved("bundle-b"), &shop(), &observation("bundle-b", Some("200.00"), true));

    let (summary, _) = dispatcher.flush_notifications().await;
    assert_eq!(summary.sent, 2);

    let sends = sends.lock().unwrap();
    let order: Vec<&str> = sends.iter().map(|s| s.product_id.as_str()).collect();
    assert_eq!(order, ["bundle-a", "bundle-b"]);
}

#[tokio::test(start_paused = true)]
async fn unwatched_product_is_ignored() {
    let (channel, sends) = FakeChannel::new();
    let mut dispatcher = dispatcher_with(channel, HashMap::new(), HashMap::new());

    dispatcher.process_result(&resolved("bundle"), &shop(), &observation("bundle", Some("10.00"), true));

    assert_eq!(dispatcher.queue_len(), 0);
    dispatcher.flush_notifications().await;
    assert!(sends.lock().unwrap().is_empty());
}
