pub mod app_config;
pub mod config;
pub mod products;
pub mod results;
pub mod shops;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use results::{hour_bucket, ProductResult};
pub use products::{
    kebab_id, resolve_product, resolve_products, Product, ProductSet, ProductType,
    ResolvedProduct, SearchSpec,
};
pub use shops::{
    load_shop_configs, AntiBot, EngineKind, Extract, FetchingTier, PriceFormat, ProductPageSelectors,
    SearchPageSelectors, Selector, SelectorGroup, SelectorKind, SelectorValue, ShopConfig,
    ShopSelectors,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    MissingEnvVar(String),

    #[error("invalid env var {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read shop config dir {path}: {source}")]
    ShopDirIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read shop config {path}: {source}")]
    ShopFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse shop config {path}: {source}")]
    ShopFileParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("validation error: {0}")]
    Validation(String),
}
