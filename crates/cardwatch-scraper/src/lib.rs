pub mod engine;
pub mod error;
pub mod extract;
pub mod governor;
pub mod matcher;
pub mod normalize;
pub mod price;
pub(crate) mod retry;
pub mod scrape;

pub use cardwatch_core::{hour_bucket, ProductResult};
pub use engine::{create_engine, EngineSettings, PageEngine, RetryPolicy};
pub use error::ScrapeError;
pub use extract::Document;
pub use governor::ShopGovernor;
pub use matcher::title_matches;
pub use normalize::{build_search_url, normalize_url, slug_title};
pub use price::parse_price;
pub use scrape::scrape_product;
