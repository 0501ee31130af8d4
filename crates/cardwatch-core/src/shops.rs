//! Shop configuration model.
//!
//! Each monitored shop is described by one JSON file in the configured
//! directory. The file carries the shop's search endpoint, the engine used to
//! render it, anti-bot settings, and the selector spec for its search and
//! product pages.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Which page engine a shop requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    StaticHtml,
    HeadlessBrowser,
}

/// Coarse latency class of a shop, controlling how often it is scraped.
///
/// `SuperFast` shops run every cycle tick; the slower tiers run on integer
/// multiples of the tick configured in [`crate::AppConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchingTier {
    SuperSlow,
    Slow,
    Fast,
    SuperFast,
}

impl FetchingTier {
    /// Ticks between runs for this tier given the configured multipliers.
    #[must_use]
    pub fn ticks_between_runs(self, fast: u64, slow: u64, super_slow: u64) -> u64 {
        match self {
            FetchingTier::SuperFast => 1,
            FetchingTier::Fast => fast.max(1),
            FetchingTier::Slow => slow.max(1),
            FetchingTier::SuperSlow => super_slow.max(1),
        }
    }
}

/// How a selector locates nodes in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorKind {
    Css,
    Xpath,
    Text,
}

/// What to pull out of a located node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Extract {
    Href,
    Text,
    InnerHtml,
}

/// Locale of a shop's price strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceFormat {
    European,
    Us,
}

/// A selector value: a single expression or an ordered fallback list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorValue {
    One(String),
    Many(Vec<String>),
}

impl SelectorValue {
    /// All expressions in fallback order.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        match self {
            SelectorValue::One(value) => std::slice::from_ref(value),
            SelectorValue::Many(values) => values,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            SelectorValue::One(value) => value.is_empty(),
            SelectorValue::Many(values) => values.iter().all(String::is_empty),
        }
    }
}

/// One pluggable DOM query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    #[serde(rename = "type")]
    pub kind: SelectorKind,
    pub value: SelectorValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<Extract>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<PriceFormat>,
    /// When set, the extracted text must equal this literal
    /// (case-insensitively, whitespace-normalised) or the extraction is
    /// treated as a miss.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_text: Option<String>,
}

impl Selector {
    /// Convenience constructor for a single-expression CSS selector.
    #[must_use]
    pub fn css(value: &str) -> Self {
        Selector {
            kind: SelectorKind::Css,
            value: SelectorValue::One(value.to_string()),
            extract: None,
            format: None,
            match_text: None,
        }
    }
}

/// A single selector or a list of alternatives; ANY match counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorGroup {
    One(Selector),
    Many(Vec<Selector>),
}

impl SelectorGroup {
    pub fn iter(&self) -> impl Iterator<Item = &Selector> {
        match self {
            SelectorGroup::One(selector) => std::slice::from_ref(selector).iter(),
            SelectorGroup::Many(selectors) => selectors.iter(),
        }
    }
}

/// Selectors applied to a shop's search-results page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPageSelectors {
    /// Container node of one result listing.
    pub article: Selector,
    /// Link to the product page, extracted relative to the article.
    pub product_url: Selector,
    pub title: Selector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Selector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<SelectorGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unavailable: Option<SelectorGroup>,
}

/// Selectors applied to a shop's product page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPageSelectors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<Selector>,
    pub price: Selector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<SelectorGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unavailable: Option<SelectorGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopSelectors {
    pub search_page: SearchPageSelectors,
    pub product_page: ProductPageSelectors,
}

/// Anti-bot knobs for one shop. All optional; defaults come from
/// [`crate::AppConfig`] and global proxy settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AntiBot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub use_proxy: bool,
}

/// Immutable description of one monitored shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopConfig {
    pub id: String,
    pub name: String,
    pub base_url: String,
    /// Search endpoint; `{query}` is substituted with the URL-encoded primary
    /// search phrase, or the phrase is appended when the slot is absent.
    pub search_url: String,
    pub engine: EngineKind,
    pub fetching_tier: FetchingTier,
    #[serde(default)]
    pub anti_bot: AntiBot,
    /// When the shop's search endpoint redirects straight to a product page,
    /// this regex matches the post-navigation URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_hit_pattern: Option<String>,
    /// When true and the search page carries price + availability signals,
    /// the scraper may emit a result without opening the product page.
    #[serde(default)]
    pub skip_product_page: bool,
    #[serde(default)]
    pub disabled: bool,
    pub selectors: ShopSelectors,
}

/// Parse one shop config from its JSON source.
///
/// # Errors
///
/// Returns [`ConfigError::ShopFileParse`] on malformed JSON and
/// [`ConfigError::Validation`] when the parsed config is inconsistent.
pub fn parse_shop_config(path: &str, json: &str) -> Result<ShopConfig, ConfigError> {
    let shop: ShopConfig =
        serde_json::from_str(json).map_err(|e| ConfigError::ShopFileParse {
            path: path.to_string(),
            source: e,
        })?;
    validate_shop(&shop)?;
    Ok(shop)
}

/// Load all shop configs from a directory of `*.json` files.
///
/// Files are read in sorted order for determinism. Shops marked
/// `disabled: true` are excluded from the returned list.
///
/// # Errors
///
/// Returns `ConfigError` if the directory cannot be read, any file fails to
/// parse or validate, or two shops share an id.
pub fn load_shop_configs(dir: &Path) -> Result<Vec<ShopConfig>, ConfigError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ConfigError::ShopDirIo {
        path: dir.display().to_string(),
        source: e,
    })?;

    let mut paths: Vec<_> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut shops = Vec::new();
    let mut seen_ids = HashSet::new();

    for path in paths {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::ShopFileIo {
            path: display.clone(),
            source: e,
        })?;
        let shop = parse_shop_config(&display, &content)?;

        if !seen_ids.insert(shop.id.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate shop id: '{}'",
                shop.id
            )));
        }

        if shop.disabled {
            continue;
        }
        shops.push(shop);
    }

    Ok(shops)
}

fn validate_shop(shop: &ShopConfig) -> Result<(), ConfigError> {
    if shop.id.trim().is_empty() {
        return Err(ConfigError::Validation("shop id must be non-empty".into()));
    }
    if shop.name.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "shop '{}' has an empty name",
            shop.id
        )));
    }
    if !shop.base_url.starts_with("http://") && !shop.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "shop '{}' baseUrl must be absolute, got '{}'",
            shop.id, shop.base_url
        )));
    }
    if shop.search_url.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "shop '{}' searchUrl must be non-empty",
            shop.id
        )));
    }
    if let Some(pattern) = &shop.direct_hit_pattern {
        regex::Regex::new(pattern).map_err(|e| {
            ConfigError::Validation(format!(
                "shop '{}' directHitPattern does not compile: {e}",
                shop.id
            ))
        })?;
    }
    if shop.skip_product_page && shop.selectors.search_page.price.is_none() {
        return Err(ConfigError::Validation(format!(
            "shop '{}' sets skipProductPage without a searchPage.price selector",
            shop.id
        )));
    }
    // The article selector yields candidate fragments, which only CSS
    // selection supports; per-fragment selectors are free to use any kind.
    if shop.selectors.search_page.article.kind != SelectorKind::Css {
        return Err(ConfigError::Validation(format!(
            "shop '{}' searchPage.article must be a css selector",
            shop.id
        )));
    }

    for (label, selector) in selector_fields(shop) {
        if selector.value.is_empty() {
            return Err(ConfigError::Validation(format!(
                "shop '{}' selector {label} has an empty value",
                shop.id
            )));
        }
    }

    Ok(())
}

/// Flat view of every selector in a shop config, labelled for error messages.
fn selector_fields(shop: &ShopConfig) -> Vec<(String, &Selector)> {
    let mut fields: Vec<(String, &Selector)> = Vec::new();
    let search = &shop.selectors.search_page;
    fields.push(("searchPage.article".into(), &search.article));
    fields.push(("searchPage.productUrl".into(), &search.product_url));
    fields.push(("searchPage.title".into(), &search.title));
    if let Some(price) = &search.price {
        fields.push(("searchPage.price".into(), price));
    }
    push_group(&mut fields, "searchPage.available", search.available.as_ref());
    push_group(
        &mut fields,
        "searchPage.unavailable",
        search.unavailable.as_ref(),
    );

    let product = &shop.selectors.product_page;
    if let Some(title) = &product.title {
        fields.push(("productPage.title".into(), title));
    }
    fields.push(("productPage.price".into(), &product.price));
    push_group(
        &mut fields,
        "productPage.available",
        product.available.as_ref(),
    );
    push_group(
        &mut fields,
        "productPage.unavailable",
        product.unavailable.as_ref(),
    );
    fields
}

fn push_group<'a>(
    fields: &mut Vec<(String, &'a Selector)>,
    label: &str,
    group: Option<&'a SelectorGroup>,
) {
    if let Some(group) = group {
        for (i, selector) in group.iter().enumerate() {
            fields.push((format!("{label}[{i}]"), selector));
        }
    }
}

#[cfg(test)]
#[path = "shops_test.rs"]
mod tests;
