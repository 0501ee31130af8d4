//! Watchlist product model and search resolution.
//!
//! Products are admin-managed rows read at cycle start. A product's search
//! phrases may be partly inherited from its product type; resolution
//! materialises the final phrase/exclusion lists before any scraping happens.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Search phrases and exclusions for a product or product type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSpec {
    #[serde(default)]
    pub phrases: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    /// When true the product's own spec replaces the type's instead of
    /// merging with it.
    #[serde(default, rename = "override")]
    pub override_type: bool,
}

/// A watchlist catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Kebab-case of the product name, e.g. `"151-booster-bundle"`.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub product_set_id: Option<String>,
    #[serde(default)]
    pub product_type_id: Option<String>,
    #[serde(default)]
    pub search: Option<SearchSpec>,
    #[serde(default)]
    pub max_price: Option<Decimal>,
    #[serde(default)]
    pub min_price: Option<Decimal>,
    #[serde(default)]
    pub disabled: bool,
}

/// A class of products sharing default search behaviour, e.g. "booster box".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductType {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub search: Option<SearchSpec>,
}

/// A release a product belongs to, e.g. "Surging Sparks".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSet {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub series_name: Option<String>,
}

/// A product with its search phrases and exclusions fully materialised.
///
/// Invariant: `phrases` is non-empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProduct {
    pub product: Product,
    pub phrases: Vec<String>,
    pub exclude: Vec<String>,
}

impl ResolvedProduct {
    /// The phrase substituted into a shop's `searchUrl` `{query}` slot.
    #[must_use]
    pub fn primary_phrase(&self) -> &str {
        &self.phrases[0]
    }
}

/// Generate a kebab-case id from a product name.
#[must_use]
pub fn kebab_id(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else if c == ' ' {
                '-'
            } else {
                '\0'
            }
        })
        .filter(|&c| c != '\0')
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Materialise a product's search config.
///
/// The product's own spec merges with its type's spec (phrase and exclusion
/// union, product entries first) unless the product sets `override: true`.
/// A product with no phrases from either source falls back to its name.
///
/// Generic-set protection: when the product's set is the generic set of its
/// series (set name equals the series name), the names of the sibling sets in
/// that series are added to the exclusion list, so e.g. a search for
/// "Scarlet & Violet booster box" does not match "Scarlet & Violet — Surging
/// Sparks booster box".
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] if the product references an unknown
/// product type.
pub fn resolve_product(
    product: &Product,
    types: &HashMap<String, ProductType>,
    sets: &[ProductSet],
) -> Result<ResolvedProduct, ConfigError> {
    let type_spec = match &product.product_type_id {
        Some(type_id) => Some(
            types
                .get(type_id)
                .ok_or_else(|| {
                    ConfigError::Validation(format!(
                        "product '{}' references unknown product type '{type_id}'",
                        product.id
                    ))
                })?
                .search
                .clone()
                .unwrap_or_default(),
        ),
        None => None,
    };

    let own = product.search.clone().unwrap_or_default();

    let (mut phrases, mut exclude) = if own.override_type {
        (own.phrases, own.exclude)
    } else {
        let mut phrases = own.phrases;
        let mut exclude = own.exclude;
        if let Some(type_spec) = type_spec {
            merge_unique(&mut phrases, type_spec.phrases);
            merge_unique(&mut exclude, type_spec.exclude);
        }
        (phrases, exclude)
    };

    if phrases.is_empty() {
        phrases.push(product.name.clone());
    }

    if let Some(set) = product
        .product_set_id
        .as_ref()
        .and_then(|set_id| sets.iter().find(|s| &s.id == set_id))
    {
        if let Some(series_name) = &set.series_name {
            if set.name.eq_ignore_ascii_case(series_name) {
                let siblings = sets.iter().filter(|other| {
                    other.id != set.id
                        && other.series_name.as_deref()
                            == Some(series_name.as_str())
                });
                merge_unique(&mut exclude, siblings.map(|s| s.name.clone()).collect());
            }
        }
    }

    Ok(ResolvedProduct {
        product: product.clone(),
        phrases,
        exclude,
    })
}

/// Resolve every active product, skipping disabled entries.
///
/// # Errors
///
/// Propagates the first resolution failure.
pub fn resolve_products(
    products: &[Product],
    types: &HashMap<String, ProductType>,
    sets: &[ProductSet],
) -> Result<Vec<ResolvedProduct>, ConfigError> {
    products
        .iter()
        .filter(|p| !p.disabled)
        .map(|p| resolve_product(p, types, sets))
        .collect()
}

fn merge_unique(target: &mut Vec<String>, extra: Vec<String>) {
    for item in extra {
        if !target
            .iter()
            .any(|existing| existing.eq_ignore_ascii_case(&item))
        {
            target.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, name: &str) -> Product {
        Product {
            id: id.to_string(),
            name: name.to_string(),
            product_set_id: None,
            product_type_id: None,
            search: None,
            max_price: None,
            min_price: None,
            disabled: false,
        }
    }

    fn booster_box_type() -> HashMap<String, ProductType> {
        let mut types = HashMap::new();
        types.insert(
            "booster-box".to_string(),
            ProductType {
                id: "booster-box".to_string(),
                name: "Booster Box".to_string(),
                search: Some(SearchSpec {
                    phrases: vec!["booster box".to_string()],
                    exclude: vec!["proxy".to_string()],
                    override_type: false,
                }),
            },
        );
        types
    }

    #[test]
    fn kebab_id_simple_name() {
        assert_eq!(kebab_id("151 Booster Bundle"), "151-booster-bundle");
    }

    #[test]
    fn kebab_id_strips_punctuation() {
        assert_eq!(kebab_id("Scarlet & Violet: 151"), "scarlet-violet-151");
    }

    #[test]
    fn resolve_merges_type_spec() {
        let mut p = product("surging-sparks-booster-box", "Surging Sparks Booster Box");
        p.product_type_id = Some("booster-box".to_string());
        p.search = Some(SearchSpec {
            phrases: vec!["surging sparks".to_string()],
            exclude: vec![],
            override_type: false,
        });

        let resolved = resolve_product(&p, &booster_box_type(), &[]).unwrap();
        assert_eq!(resolved.phrases, ["surging sparks", "booster box"]);
        assert_eq!(resolved.exclude, ["proxy"]);
        assert_eq!(resolved.primary_phrase(), "surging sparks");
    }

    #[test]
    fn resolve_override_skips_type_spec() {
        let mut p = product("surging-sparks-booster-box", "Surging Sparks Booster Box");
        p.product_type_id = Some("booster-box".to_string());
        p.search = Some(SearchSpec {
            phrases: vec!["surging sparks display".to_string()],
            exclude: vec![],
            override_type: true,
        });

        let resolved = resolve_product(&p, &booster_box_type(), &[]).unwrap();
        assert_eq!(resolved.phrases, ["surging sparks display"]);
        assert!(resolved.exclude.is_empty());
    }

    #[test]
    fn resolve_falls_back_to_product_name() {
        let p = product("151-booster-bundle", "151 Booster Bundle");
        let resolved = resolve_product(&p, &HashMap::new(), &[]).unwrap();
        assert_eq!(resolved.phrases, ["151 Booster Bundle"]);
    }

    #[test]
    fn resolve_merge_dedupes_case_insensitively() {
        let mut p = product("x", "X");
        p.product_type_id = Some("booster-box".to_string());
        p.search = Some(SearchSpec {
            phrases: vec!["Booster Box".to_string()],
            exclude: vec!["PROXY".to_string()],
            override_type: false,
        });

        let resolved = resolve_product(&p, &booster_box_type(), &[]).unwrap();
        assert_eq!(resolved.phrases, ["Booster Box"]);
        assert_eq!(resolved.exclude, ["PROXY"]);
    }

    #[test]
    fn resolve_rejects_unknown_type() {
        let mut p = product("x", "X");
        p.product_type_id = Some("does-not-exist".to_string());
        let err = resolve_product(&p, &HashMap::new(), &[]).unwrap_err();
        assert!(err.to_string().contains("unknown product type"));
    }

    #[test]
    fn generic_set_excludes_sibling_set_names() {
        let sets = vec![
            ProductSet {
                id: "sv".to_string(),
                name: "Scarlet & Violet".to_string(),
                series_name: Some("Scarlet & Violet".to_string()),
            },
            ProductSet {
                id: "sv-surging-sparks".to_string(),
                name: "Surging Sparks".to_string(),
                series_name: Some("Scarlet & Violet".to_string()),
            },
            ProductSet {
                id: "swsh-base".to_string(),
                name: "Sword & Shield".to_string(),
                series_name: Some("Sword & Shield".to_string()),
            },
        ];

        let mut p = product("sv-booster-box", "Scarlet & Violet Booster Box");
        p.product_set_id = Some("sv".to_string());

        let resolved = resolve_product(&p, &HashMap::new(), &sets).unwrap();
        assert_eq!(resolved.exclude, ["Surging Sparks"]);
    }

    #[test]
    fn non_generic_set_gets_no_auto_exclusions() {
        let sets = vec![
            ProductSet {
                id: "sv".to_string(),
                name: "Scarlet & Violet".to_string(),
                series_name: Some("Scarlet & Violet".to_string()),
            },
            ProductSet {
                id: "sv-surging-sparks".to_string(),
                name: "Surging Sparks".to_string(),
                series_name: Some("Scarlet & Violet".to_string()),
            },
        ];

        let mut p = product("surging-sparks-box", "Surging Sparks Booster Box");
        p.product_set_id = Some("sv-surging-sparks".to_string());

        let resolved = resolve_product(&p, &HashMap::new(), &sets).unwrap();
        assert!(resolved.exclude.is_empty());
    }

    #[test]
    fn resolve_products_skips_disabled() {
        let mut disabled = product("a", "A");
        disabled.disabled = true;
        let active = product("b", "B");

        let resolved = resolve_products(&[disabled, active], &HashMap::new(), &[]).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].product.id, "b");
    }
}
