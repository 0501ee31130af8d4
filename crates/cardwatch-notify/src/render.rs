//! Polish alert message rendering, shared by the channel adapters.

use rust_decimal::Decimal;

use crate::channel::NotificationPayload;

/// Formats a price in złoty: two decimal places, comma separator.
#[must_use]
pub fn format_pln(price: Decimal) -> String {
    let rounded = price.round_dp(2);
    format!("{rounded:.2} zł").replace('.', ",")
}

/// Renders the alert text. Both prices appear when the offer undercuts the
/// user's limit; an at-limit offer shows only the current price.
#[must_use]
pub fn render_message(payload: &NotificationPayload) -> String {
    let price = format_pln(payload.price);
    let price_line = if payload.price < payload.max_price {
        format!(
            "Cena: {price} (Twój limit: {})",
            format_pln(payload.max_price)
        )
    } else {
        format!("Cena: {price}")
    };
    format!(
        "🎴 {product} jest dostępny w {shop}!\n{price_line}\n{url}",
        product = payload.product_name,
        shop = payload.shop_name,
        url = payload.product_url,
    )
}
