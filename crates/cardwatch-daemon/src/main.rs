mod cycle;
mod sweep;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cardwatch_db::Channel;
use cardwatch_notify::{
    ChannelAdapter, Dispatcher, DispatcherConfig, DiscordChannel, TelegramChannel,
};

use crate::cycle::CycleRunner;

/// Availability monitor for trading-card products across online shops.
#[derive(Debug, Parser)]
#[command(name = "cardwatch-daemon", version)]
struct Args {
    /// Run a single cycle over every enabled shop, then exit.
    #[arg(long)]
    once: bool,

    /// Restrict scraping to one shop id (useful when tuning a shop config).
    #[arg(long)]
    shop: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let config = Arc::new(cardwatch_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = cardwatch_db::PoolConfig::from_app_config(&config);
    let pool = cardwatch_db::connect_pool(&config.database_url, pool_config).await?;
    cardwatch_db::run_migrations(&pool).await?;

    // Validate shop configs up front: a malformed config is fatal at
    // startup, not on the first tick.
    let shops = cardwatch_core::load_shop_configs(&config.shops_dir)?;
    if let Some(only) = &args.shop {
        anyhow::ensure!(
            shops.iter().any(|shop| &shop.id == only),
            "no enabled shop with id '{only}'"
        );
    }
    tracing::info!(shops = shops.len(), "loaded shop configs");

    let dispatcher = Dispatcher::new(
        build_adapters(&config)?,
        DispatcherConfig {
            batch_size: config.flush_batch_size,
            batch_delay: Duration::from_millis(config.flush_batch_delay_ms),
        },
    );
    let mut runner = CycleRunner::new(Arc::clone(&config), pool.clone(), args.shop, dispatcher);

    if args.once {
        runner.run_tick().await?;
        return Ok(());
    }

    let _sweeper = sweep::build_sweeper(pool.clone())
        .await
        .map_err(|e| anyhow::anyhow!("failed to start sweep scheduler: {e}"))?;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut interval = tokio::time::interval(Duration::from_secs(config.cycle_period_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                tracing::info!("shutdown signal received; exiting after current cycle");
                break;
            }
            _ = interval.tick() => {
                // A failed cycle (store outage, catalog error) is logged and
                // retried on the next tick; nothing was persisted, so the
                // same conditions re-trigger.
                if let Err(e) = runner.run_tick().await {
                    tracing::error!(error = %e, "cycle aborted");
                }
            }
        }
    }
    Ok(())
}

/// Builds one adapter per configured bot token. A channel without a token is
/// skipped: its users keep their links and start receiving alerts once the
/// token is provided.
fn build_adapters(
    config: &cardwatch_core::AppConfig,
) -> anyhow::Result<HashMap<Channel, Arc<dyn ChannelAdapter>>> {
    let mut adapters: HashMap<Channel, Arc<dyn ChannelAdapter>> = HashMap::new();
    if let Some(token) = &config.telegram_bot_token {
        adapters.insert(Channel::Telegram, Arc::new(TelegramChannel::new(token)?));
    } else {
        tracing::warn!("no telegram bot token configured; telegram deliveries disabled");
    }
    if let Some(token) = &config.discord_bot_token {
        adapters.insert(Channel::Discord, Arc::new(DiscordChannel::new(token)?));
    } else {
        tracing::warn!("no discord bot token configured; discord deliveries disabled");
    }
    Ok(adapters)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
