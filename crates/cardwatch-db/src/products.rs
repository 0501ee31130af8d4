//! Read-side loading of the product catalog (products, types, sets).
//!
//! The catalog is admin-managed through external flows; the core only reads
//! it at cycle start and resolves search specs in memory.

use std::collections::HashMap;

use rust_decimal::Decimal;
use sqlx::PgPool;

use cardwatch_core::{Product, ProductSet, ProductType, SearchSpec};

use crate::DbError;

/// Everything needed to resolve products for one cycle.
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    pub products: Vec<Product>,
    pub types: HashMap<String, ProductType>,
    pub sets: Vec<ProductSet>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ProductRow {
    id: String,
    name: String,
    product_set_id: Option<String>,
    product_type_id: Option<String>,
    search: Option<serde_json::Value>,
    max_price: Option<Decimal>,
    min_price: Option<Decimal>,
    disabled: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ProductTypeRow {
    id: String,
    name: String,
    search: Option<serde_json::Value>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ProductSetRow {
    id: String,
    name: String,
    series_name: Option<String>,
}

/// Loads the full catalog in three round-trips.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure or [`DbError::Corrupt`] when a
/// stored search spec does not deserialize.
pub async fn load_product_catalog(pool: &PgPool) -> Result<ProductCatalog, DbError> {
    let product_rows = sqlx::query_as::<_, ProductRow>(
        "SELECT id, name, product_set_id, product_type_id, search, \
                max_price, min_price, disabled \
         FROM products \
         WHERE NOT disabled \
         ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    let type_rows = sqlx::query_as::<_, ProductTypeRow>(
        "SELECT id, name, search FROM product_types ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    let set_rows = sqlx::query_as::<_, ProductSetRow>(
        "SELECT id, name, series_name FROM product_sets ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    let products = product_rows
        .into_iter()
        .map(|row| {
            Ok(Product {
                search: parse_search(row.search)?,
                id: row.id,
                name: row.name,
                product_set_id: row.product_set_id,
                product_type_id: row.product_type_id,
                max_price: row.max_price,
                min_price: row.min_price,
                disabled: row.disabled,
            })
        })
        .collect::<Result<Vec<_>, DbError>>()?;

    let types = type_rows
        .into_iter()
        .map(|row| {
            Ok((
                row.id.clone(),
                ProductType {
                    search: parse_search(row.search)?,
                    id: row.id,
                    name: row.name,
                },
            ))
        })
        .collect::<Result<HashMap<_, _>, DbError>>()?;

    let sets = set_rows
        .into_iter()
        .map(|row| ProductSet {
            id: row.id,
            name: row.name,
            series_name: row.series_name,
        })
        .collect();

    Ok(ProductCatalog {
        products,
        types,
        sets,
    })
}

fn parse_search(value: Option<serde_json::Value>) -> Result<Option<SearchSpec>, DbError> {
    value
        .map(|value| {
            serde_json::from_value(value).map_err(|e| DbError::Corrupt {
                column: "search",
                reason: e.to_string(),
            })
        })
        .transpose()
}
