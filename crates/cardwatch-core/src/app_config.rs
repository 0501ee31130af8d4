use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub shops_dir: PathBuf,
    pub telegram_bot_token: Option<String>,
    pub discord_bot_token: Option<String>,
    pub proxy_enabled: bool,
    pub proxy_url: Option<String>,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub user_agent: String,
    /// Default per-shop product scrape concurrency when the shop config
    /// does not set `antiBot.maxConcurrency`.
    pub product_concurrency: usize,
    pub navigation_timeout_secs: u64,
    pub action_timeout_secs: u64,
    pub retry_max_attempts: u32,
    pub retry_initial_delay_secs: u64,
    pub retry_max_delay_secs: u64,
    pub cycle_period_secs: u64,
    pub cycle_deadline_secs: u64,
    /// Ticks between runs for each tier slower than super-fast.
    pub tier_fast_every: u64,
    pub tier_slow_every: u64,
    pub tier_super_slow_every: u64,
    pub flush_batch_size: usize,
    pub flush_batch_delay_ms: u64,
    /// Dispatcher queue length above which the cycle pauses launching scrapes.
    pub queue_high_water: usize,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("shops_dir", &self.shops_dir)
            .field("database_url", &"[redacted]")
            .field(
                "telegram_bot_token",
                &self.telegram_bot_token.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "discord_bot_token",
                &self.discord_bot_token.as_ref().map(|_| "[redacted]"),
            )
            .field("proxy_enabled", &self.proxy_enabled)
            .field(
                "proxy_url",
                &self.proxy_url.as_ref().map(|_| "[redacted]"),
            )
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("product_concurrency", &self.product_concurrency)
            .field("navigation_timeout_secs", &self.navigation_timeout_secs)
            .field("action_timeout_secs", &self.action_timeout_secs)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("retry_initial_delay_secs", &self.retry_initial_delay_secs)
            .field("retry_max_delay_secs", &self.retry_max_delay_secs)
            .field("cycle_period_secs", &self.cycle_period_secs)
            .field("cycle_deadline_secs", &self.cycle_deadline_secs)
            .field("tier_fast_every", &self.tier_fast_every)
            .field("tier_slow_every", &self.tier_slow_every)
            .field("tier_super_slow_every", &self.tier_super_slow_every)
            .field("flush_batch_size", &self.flush_batch_size)
            .field("flush_batch_delay_ms", &self.flush_batch_delay_ms)
            .field("queue_high_water", &self.queue_high_water)
            .finish()
    }
}
