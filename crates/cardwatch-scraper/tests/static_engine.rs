//! Integration tests for the static-HTML engine.
//!
//! Uses `wiremock` to stand up a local HTTP server per test so no real
//! network traffic is made.

use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cardwatch_scraper::engine::StaticEngine;
use cardwatch_scraper::{EngineSettings, PageEngine, RetryPolicy, ScrapeError};
use cardwatch_core::Selector;

fn test_settings() -> EngineSettings {
    let mut settings = EngineSettings::new("cardwatch-test/0.1");
    settings.navigation_timeout = Duration::from_secs(5);
    settings.retry = RetryPolicy {
        max_attempts: 1,
        initial_delay_secs: 0,
        max_delay_secs: 0,
    };
    settings
}

#[tokio::test]
async fn goto_snapshots_the_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/produkt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body><h1 class='t'>151 Booster Bundle</h1></body></html>"),
        )
        .mount(&server)
        .await;

    let mut engine = StaticEngine::new(&test_settings()).expect("engine builds");
    engine
        .goto(&format!("{}/produkt", server.uri()))
        .await
        .expect("navigation succeeds");

    assert_eq!(
        engine.extract(&Selector::css("h1.t")).as_deref(),
        Some("151 Booster Bundle")
    );
    assert!(engine.exists(&Selector::css("h1.t")));
    assert!(!engine.exists(&Selector::css("h2.missing")));
}

#[tokio::test]
async fn goto_records_final_url_after_redirect() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/szukaj"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", "/p/151-booster-bundle"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/p/151-booster-bundle"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&server)
        .await;

    let mut engine = StaticEngine::new(&test_settings()).expect("engine builds");
    engine
        .goto(&format!("{}/szukaj", server.uri()))
        .await
        .expect("navigation succeeds");

    assert_eq!(
        engine.current_url(),
        Some(format!("{}/p/151-booster-bundle", server.uri()).as_str())
    );
}

#[tokio::test]
async fn goto_maps_client_error_to_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut engine = StaticEngine::new(&test_settings()).expect("engine builds");
    let err = engine
        .goto(&format!("{}/missing", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, ScrapeError::Status { status: 404, .. }));
}

#[tokio::test]
async fn goto_retries_server_errors() {
    let server = MockServer::start().await;
    // First response is a 503, afterwards the page loads.
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><p id='ok'>ok</p></html>"))
        .mount(&server)
        .await;

    let mut settings = test_settings();
    settings.retry = RetryPolicy {
        max_attempts: 3,
        initial_delay_secs: 0,
        max_delay_secs: 0,
    };
    let mut engine = StaticEngine::new(&settings).expect("engine builds");
    engine
        .goto(&format!("{}/flaky", server.uri()))
        .await
        .expect("retried navigation succeeds");

    assert!(engine.exists(&Selector::css("#ok")));
}

#[tokio::test]
async fn extraction_before_navigation_is_empty() {
    let engine = StaticEngine::new(&test_settings()).expect("engine builds");
    assert!(engine.extract(&Selector::css("h1")).is_none());
    assert!(engine.current_url().is_none());
}

#[tokio::test]
async fn navigation_timeout_is_enforced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html></html>")
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let mut settings = test_settings();
    settings.navigation_timeout = Duration::from_millis(200);
    let mut engine = StaticEngine::new(&settings).expect("engine builds");

    let err = engine
        .goto(&format!("{}/slow", server.uri()))
        .await
        .unwrap_err();
    // Either our outer timeout or reqwest's own client timeout fires first;
    // both are acceptable transient shapes.
    assert!(matches!(
        err,
        ScrapeError::Timeout { .. } | ScrapeError::Http(_)
    ));
}
