//! Locale-aware money-string parsing.
//!
//! Shops render prices in either European (`1.299,95 zł`) or US
//! (`$1,299.95`) notation; the selector config says which. Currency symbols
//! and surrounding words are ignored — only the first numeric group matters.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use cardwatch_core::PriceFormat;

static EUROPEAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,3}(?:\.\d{3})*(?:,\d{1,2})?").expect("static regex"));

static US: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,3}(?:,\d{3})*(?:\.\d{1,2})?").expect("static regex"));

/// Parses a price string in the given locale format.
///
/// Returns `None` when no numeric group matches or the cleaned-up string is
/// not a valid decimal.
#[must_use]
pub fn parse_price(text: &str, format: PriceFormat) -> Option<Decimal> {
    let (pattern, normalized): (&Regex, fn(&str) -> String) = match format {
        PriceFormat::European => (&EUROPEAN, |m| m.replace('.', "").replace(',', ".")),
        PriceFormat::Us => (&US, |m| m.replace(',', "")),
    };

    let matched = pattern.find(text)?.as_str();
    Decimal::from_str(&normalized(matched)).ok()
}
