//! Integration tests for the chat channel adapters.
//!
//! `wiremock` stands in for the Telegram and Discord APIs so the rendered
//! requests can be asserted byte-for-byte without real traffic.

use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cardwatch_notify::{ChannelAdapter, DiscordChannel, NotificationPayload, TelegramChannel};

fn payload() -> NotificationPayload {
    NotificationPayload {
        product_id: "151-booster-bundle".to_string(),
        product_name: "151 Booster Bundle".to_string(),
        shop_id: "geekowo".to_string(),
        shop_name: "Geekowo".to_string(),
        price: "399.00".parse().unwrap(),
        max_price: "450.00".parse().unwrap(),
        product_url: "https://geekowo.pl/p/151-booster-bundle".to_string(),
    }
}

#[tokio::test]
async fn telegram_posts_send_message_with_rendered_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .and(body_partial_json(serde_json::json!({
            "chat_id": "4242",
            "disable_web_page_preview": true,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let channel = TelegramChannel::with_api_base("123:abc", &server.uri()).unwrap();
    channel.send("4242", &payload()).await.expect("send succeeds");
    assert_eq!(channel.name(), "telegram");
}

#[tokio::test]
async fn telegram_rejection_is_a_delivery_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_json(
            serde_json::json!({"ok": false, "description": "bot was blocked by the user"}),
        ))
        .mount(&server)
        .await;

    let channel = TelegramChannel::with_api_base("123:abc", &server.uri()).unwrap();
    let err = channel.send("4242", &payload()).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("telegram"), "unexpected error: {message}");
    assert!(message.contains("403"), "unexpected error: {message}");
}

#[tokio::test]
async fn discord_posts_channel_message_with_bot_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/channels/987654/messages"))
        .and(header("authorization", "Bot token-x"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "1"})))
        .expect(1)
        .mount(&server)
        .await;

    let channel = DiscordChannel::with_api_base("token-x", &server.uri()).unwrap();
    channel
        .send("987654", &payload())
        .await
        .expect("send succeeds");
    assert_eq!(channel.name(), "discord");
}

#[tokio::test]
async fn discord_rate_limit_is_a_delivery_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(serde_json::json!({"message": "You are being rate limited."})),
        )
        .mount(&server)
        .await;

    let channel = DiscordChannel::with_api_base("token-x", &server.uri()).unwrap();
    let err = channel.send("987654", &payload()).await.unwrap_err();
    assert!(err.to_string().contains("429"));
}
