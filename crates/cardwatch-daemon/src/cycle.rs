//! The cycle driver: runs the shop×product matrix once per tick.
//!
//! One top-level task per shop; each shop spawns one task per product,
//! bounded by its governor's semaphore. Results flow back over an mpsc
//! channel to this task, which is the sole writer to the store and the sole
//! caller into the dispatcher. Tier gating happens at tick granularity.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use cardwatch_core::{
    load_shop_configs, resolve_products, AppConfig, ProductResult, ResolvedProduct, ShopConfig,
};
use cardwatch_db::{insert_notification_audit, load_product_catalog, upsert_result, DbError};
use cardwatch_notify::Dispatcher;
use cardwatch_scraper::{
    build_search_url, create_engine, scrape_product, EngineSettings, RetryPolicy, ShopGovernor,
};

type ResultMessage = (Arc<ShopConfig>, Arc<ResolvedProduct>, ProductResult);

pub struct CycleRunner {
    config: Arc<AppConfig>,
    pool: PgPool,
    /// When set, only this shop id is scraped (`--shop` flag).
    shop_filter: Option<String>,
    dispatcher: Dispatcher,
    tick: u64,
}

impl CycleRunner {
    #[must_use]
    pub fn new(
        config: Arc<AppConfig>,
        pool: PgPool,
        shop_filter: Option<String>,
        dispatcher: Dispatcher,
    ) -> Self {
        CycleRunner {
            config,
            pool,
            shop_filter,
            dispatcher,
            tick: 0,
        }
    }

    /// Runs one tick: every shop whose tier is due this tick gets a full
    /// product sweep. Shop configs are re-read each tick so admin edits land
    /// on the next cycle without a restart.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when config or catalog loading fails or the
    /// result store fails; a store failure aborts the cycle without
    /// persisting notification state, so the next cycle re-observes the same
    /// conditions.
    pub async fn run_tick(&mut self) -> Result<(), DbError> {
        self.tick += 1;
        let due: Vec<Arc<ShopConfig>> = load_shop_configs(&self.config.shops_dir)?
            .into_iter()
            .filter(|shop| {
                self.shop_filter
                    .as_ref()
                    .is_none_or(|only| &shop.id == only)
            })
            .filter(|shop| {
                let every = shop.fetching_tier.ticks_between_runs(
                    self.config.tier_fast_every,
                    self.config.tier_slow_every,
                    self.config.tier_super_slow_every,
                );
                // Offset so every tier runs on the first tick after startup.
                (self.tick - 1) % every == 0
            })
            .map(Arc::new)
            .collect();

        if due.is_empty() {
            tracing::debug!(tick = self.tick, "cycle: no shops due this tick");
            return Ok(());
        }
        self.run_cycle(due).await
    }

    async fn run_cycle(&mut self, shops: Vec<Arc<ShopConfig>>) -> Result<(), DbError> {
        let started = std::time::Instant::now();

        let catalog = load_product_catalog(&self.pool).await?;
        let resolved = resolve_products(&catalog.products, &catalog.types, &catalog.sets)?;
        let product_ids: Vec<String> = resolved.iter().map(|p| p.product.id.clone()).collect();

        let subscribed = self
            .dispatcher
            .preload_for_cycle(&self.pool, &product_ids)
            .await?;

        // Unsubscribed products are not worth a scrape; set grouping keeps
        // sibling products adjacent so a shop hits related list pages
        // back-to-back.
        let mut products: Vec<Arc<ResolvedProduct>> = resolved
            .into_iter()
            .filter(|p| subscribed.contains(&p.product.id))
            .map(Arc::new)
            .collect();
        products.sort_by(|a, b| {
            (&a.product.product_set_id, &a.product.id).cmp(&(&b.product.product_set_id, &b.product.id))
        });

        if products.is_empty() {
            tracing::info!(tick = self.tick, "cycle: no subscribed products; skipping");
            return Ok(());
        }

        tracing::info!(
            tick = self.tick,
            shops = shops.len(),
            products = products.len(),
            "cycle: starting"
        );

        let queue_depth = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::channel::<ResultMessage>(256);
        let mut shop_tasks: JoinSet<()> = JoinSet::new();
        for shop in shops {
            shop_tasks.spawn(run_shop(
                Arc::clone(&self.config),
                shop,
                products.clone(),
                tx.clone(),
                Arc::clone(&queue_depth),
            ));
        }
        drop(tx);

        // Collect until all shop tasks hang up or the cycle deadline fires.
        let deadline = Duration::from_secs(self.config.cycle_deadline_secs);
        let mut results = 0usize;
        let collect = async {
            while let Some((shop, product, result)) = rx.recv().await {
                upsert_result(&self.pool, &result).await?;
                self.dispatcher.process_result(&product, &shop, &result);
                queue_depth.store(self.dispatcher.queue_len(), Ordering::Relaxed);
                results += 1;
            }
            Ok::<(), DbError>(())
        };
        match tokio::time::timeout(deadline, collect).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                // Store failure: drop everything and surface the error; the
                // flush phase must not run on a cycle we could not record.
                shop_tasks.abort_all();
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(
                    deadline_secs = self.config.cycle_deadline_secs,
                    "cycle: deadline exceeded; cancelling outstanding scrapes"
                );
                shop_tasks.abort_all();
            }
        }
        while shop_tasks.join_next().await.is_some() {}

        // Cancellation keeps partial results: the queue drains regardless.
        let (summary, audits) = self.dispatcher.flush_notifications().await;
        for audit in &audits {
            if let Err(e) = insert_notification_audit(&self.pool, audit).await {
                tracing::warn!(error = %e, "cycle: audit insert failed");
            }
        }

        let persisted = self.dispatcher.persist_state(&self.pool).await?;

        tracing::info!(
            tick = self.tick,
            results,
            sent = summary.sent,
            failed = summary.failed,
            state_entries = persisted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cycle: complete"
        );
        Ok(())
    }
}

/// One shop's sweep: per-product tasks bounded by the governor, with
/// backpressure against the dispatcher queue.
async fn run_shop(
    config: Arc<AppConfig>,
    shop: Arc<ShopConfig>,
    products: Vec<Arc<ResolvedProduct>>,
    tx: mpsc::Sender<ResultMessage>,
    queue_depth: Arc<AtomicUsize>,
) {
    let governor = Arc::new(ShopGovernor::new(
        &shop.anti_bot,
        config.product_concurrency,
        config.proxy_enabled,
    ));

    let mut settings = EngineSettings::new(&config.user_agent);
    settings.navigation_timeout = Duration::from_secs(config.navigation_timeout_secs);
    settings.action_timeout = Duration::from_secs(config.action_timeout_secs);
    settings.retry = RetryPolicy {
        max_attempts: config.retry_max_attempts,
        initial_delay_secs: config.retry_initial_delay_secs,
        max_delay_secs: config.retry_max_delay_secs,
    };
    if governor.use_proxy() {
        settings.proxy_url.clone_from(&config.proxy_url);
    }

    let mut product_tasks: JoinSet<()> = JoinSet::new();
    for product in products {
        // Backpressure: stop launching while the dispatcher queue is over
        // the high-water mark; flushing catches up at cycle end, so this
        // only bites on very large fan-outs.
        while queue_depth.load(Ordering::Relaxed) > config.queue_high_water {
            tokio::time::sleep(Duration::from_millis(250)).await;
        }

        let Ok(permit) = governor.acquire().await else {
            break;
        };
        product_tasks.spawn(scrape_one(
            Arc::clone(&shop),
            product,
            settings.clone(),
            tx.clone(),
            Arc::clone(&governor),
            permit,
        ));
    }
    while product_tasks.join_next().await.is_some() {}
}

async fn scrape_one(
    shop: Arc<ShopConfig>,
    product: Arc<ResolvedProduct>,
    settings: EngineSettings,
    tx: mpsc::Sender<ResultMessage>,
    governor: Arc<ShopGovernor>,
    permit: tokio::sync::OwnedSemaphorePermit,
) {
    governor.pace().await;

    let result = match create_engine(shop.engine, &settings).await {
        Ok(mut engine) => {
            let result = scrape_product(&shop, &product, engine.as_mut()).await;
            if let Err(e) = engine.close().await {
                tracing::debug!(shop = %shop.id, error = %e, "engine close failed");
            }
            result
        }
        Err(e) => {
            tracing::error!(shop = %shop.id, product = %product.product.id, error = %e, "engine unavailable");
            let url = build_search_url(&shop.search_url, product.primary_phrase());
            ProductResult::unavailable(&product.product.id, &shop.id, &url)
        }
    };

    // A closed receiver means the cycle was cancelled; nothing to do.
    let _ = tx.send((shop, product, result)).await;
    drop(permit);
}
