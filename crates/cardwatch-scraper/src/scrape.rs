//! The per-(shop, product) scrape algorithm.
//!
//! Search → candidate match → product-page verify → [`ProductResult`].
//! The boundary never propagates an error: any irrecoverable failure is
//! logged and emitted as an unavailable, unpriced observation so one bad
//! page cannot poison a shop's remaining products.

use regex::Regex;
use rust_decimal::Decimal;

use cardwatch_core::{
    PriceFormat, ProductResult, ResolvedProduct, Selector, SelectorGroup, ShopConfig,
};

use crate::engine::PageEngine;
use crate::error::ScrapeError;
use crate::extract::Document;
use crate::matcher::title_matches;
use crate::normalize::{build_search_url, normalize_url, slug_title};
use crate::price::parse_price;

/// A search-page listing that survived URL and title extraction.
struct Candidate {
    title: String,
    url: String,
    fragment: Document,
}

/// Scrapes one product at one shop with the given (already governed) engine.
///
/// Never fails: error paths produce an unavailable observation.
pub async fn scrape_product(
    shop: &ShopConfig,
    product: &ResolvedProduct,
    engine: &mut dyn PageEngine,
) -> ProductResult {
    let search_url = build_search_url(&shop.search_url, product.primary_phrase());
    match scrape_inner(shop, product, engine, &search_url).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(
                shop = %shop.id,
                product = %product.product.id,
                error = %e,
                "scrape failed; recording unavailable"
            );
            let url = engine.current_url().unwrap_or(&search_url).to_string();
            ProductResult::unavailable(&product.product.id, &shop.id, &url)
        }
    }
}

async fn scrape_inner(
    shop: &ShopConfig,
    product: &ResolvedProduct,
    engine: &mut dyn PageEngine,
    search_url: &str,
) -> Result<ProductResult, ScrapeError> {
    engine.goto(search_url).await?;

    // Some shops 3xx-redirect a precise query straight to the product page.
    if is_direct_hit(shop, engine.current_url()) {
        let landed_url = engine
            .current_url()
            .map(ToString::to_string)
            .unwrap_or_else(|| search_url.to_string());
        return Ok(product_page_result(shop, product, engine.document()?, &landed_url));
    }

    let document = engine.document()?;
    let candidates = collect_candidates(document, shop);
    tracing::debug!(
        shop = %shop.id,
        product = %product.product.id,
        candidates = candidates.len(),
        "collected search candidates"
    );

    // First matching candidate in DOM order wins.
    let Some(candidate) = candidates
        .into_iter()
        .find(|c| title_matches(&c.title, &product.phrases, &product.exclude))
    else {
        return Ok(ProductResult::unavailable(
            &product.product.id,
            &shop.id,
            search_url,
        ));
    };

    // Listing short-circuit: when the shop opts in and the listing already
    // shows the product as buyable, the search page is the observation.
    let search_selectors = &shop.selectors.search_page;
    if shop.skip_product_page {
        if let Some(price_selector) = &search_selectors.price {
            let available = availability(
                &candidate.fragment,
                search_selectors.available.as_ref(),
                search_selectors.unavailable.as_ref(),
            );
            if available {
                let price = price_from(&candidate.fragment, price_selector);
                return Ok(observed(product, shop, &candidate.url, price, true));
            }
        }
    }

    engine.goto(&candidate.url).await?;
    let landed_url = engine
        .current_url()
        .map(ToString::to_string)
        .unwrap_or_else(|| candidate.url.clone());
    Ok(product_page_result(shop, product, engine.document()?, &landed_url))
}

/// Reads title (for validation), availability, and price off a product page.
fn product_page_result(
    shop: &ShopConfig,
    product: &ResolvedProduct,
    document: &Document,
    url: &str,
) -> ProductResult {
    let selectors = &shop.selectors.product_page;

    let title = selectors
        .title
        .as_ref()
        .and_then(|selector| document.extract(selector))
        .or_else(|| slug_title(url));
    if let Some(title) = title {
        if !title_matches(&title, &product.phrases, &product.exclude) {
            tracing::debug!(
                shop = %shop.id,
                product = %product.product.id,
                title,
                "product page title fails match policy"
            );
            return ProductResult::unavailable(&product.product.id, &shop.id, url);
        }
    }

    let available = availability(
        document,
        selectors.available.as_ref(),
        selectors.unavailable.as_ref(),
    );
    let price = price_from(document, &selectors.price);
    observed(product, shop, url, price, available)
}

fn is_direct_hit(shop: &ShopConfig, current_url: Option<&str>) -> bool {
    let (Some(pattern), Some(current_url)) = (&shop.direct_hit_pattern, current_url) else {
        return false;
    };
    // Pattern validity is enforced at config load.
    Regex::new(pattern).is_ok_and(|regex| regex.is_match(current_url))
}

fn collect_candidates(document: &Document, shop: &ShopConfig) -> Vec<Candidate> {
    let selectors = &shop.selectors.search_page;
    document
        .select_fragments(&selectors.article)
        .into_iter()
        .filter_map(|fragment| {
            let href = fragment.extract(&selectors.product_url)?;
            let url = match normalize_url(&href, &shop.base_url) {
                Ok(url) => url,
                Err(e) => {
                    tracing::debug!(shop = %shop.id, href, error = %e, "unusable candidate URL");
                    return None;
                }
            };
            // Slug fallback covers shops that truncate listing titles.
            let title = fragment
                .extract(&selectors.title)
                .or_else(|| slug_title(&url))?;
            Some(Candidate {
                title,
                url,
                fragment,
            })
        })
        .collect()
}

/// ANY `unavailable` match wins over ANY `available` match; neither matching
/// means the product is treated as unavailable.
fn availability(
    document: &Document,
    available: Option<&SelectorGroup>,
    unavailable: Option<&SelectorGroup>,
) -> bool {
    if document.any_match(unavailable) {
        return false;
    }
    document.any_match(available)
}

fn price_from(document: &Document, selector: &Selector) -> Option<Decimal> {
    let text = document.extract(selector)?;
    parse_price(&text, selector.format.unwrap_or(PriceFormat::European))
}

fn observed(
    product: &ResolvedProduct,
    shop: &ShopConfig,
    url: &str,
    price: Option<Decimal>,
    is_available: bool,
) -> ProductResult {
    ProductResult {
        product_id: product.product.id.clone(),
        shop_id: shop.id.clone(),
        product_url: url.to_string(),
        price,
        is_available,
        timestamp: chrono::Utc::now(),
    }
}

#[cfg(test)]
#[path = "scrape_test.rs"]
mod tests;
