//! Scenario 6: a 429 with a numeric `Retry-After` delays the next attempt by
//! at least that many seconds, and the notifier stops retrying on success.

use std::collections::HashMap;
use std::time::Instant;
use watchcluster::models::{WebhookEvent, WebhookEventType};
use watchcluster::notifier::{EventGates, Notifier, NotifierConfig, WebhookNotifier};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn retry_after_header_delays_the_next_attempt() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let config = NotifierConfig {
        url: Some(format!("{}/hook", server.uri())),
        timeout_ms: 5_000,
        retry_count: 3,
        headers: HashMap::new(),
        per_event_enabled: EventGates { detected: true, started: true, completed: true, failed: true },
    };
    let notifier = WebhookNotifier::new(config);

    let event = WebhookEvent::new(
        WebhookEventType::DeploymentDetected,
        "default",
        "app",
        "nginx:1.21.0",
        HashMap::new(),
    );

    let start = Instant::now();
    notifier.send(&event).await;
    let elapsed = start.elapsed();

    assert!(elapsed.as_secs_f64() >= 2.0, "expected at least a 2s delay, got {:?}", elapsed);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
}

#[tokio::test]
async fn disabled_event_type_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = NotifierConfig {
        url: Some(format!("{}/hook", server.uri())),
        timeout_ms: 5_000,
        retry_count: 3,
        headers: HashMap::new(),
        per_event_enabled: EventGates::default(),
    };
    let notifier = WebhookNotifier::new(config);

    let event = WebhookEvent::new(
        WebhookEventType::DeploymentDetected,
        "default",
        "app",
        "nginx:1.21.0",
        HashMap::new(),
    );
    notifier.send(&event).await;
}
