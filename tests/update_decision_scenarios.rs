//! The seven literal end-to-end scenarios this system is expected to satisfy.

mod common;

use serde_json::json;
use watchcluster::decision::check_for_update;
use watchcluster::registry::RegistryGateway;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mock_tags(server: &MockServer, namespace_path: &str, tags: &[&str]) {
    let results: Vec<_> = tags.iter().map(|t| json!({"name": t, "digest": null})).collect();
    Mock::given(method("GET"))
        .and(path(format!("/v2/repositories/{}/tags/", namespace_path)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": results})))
        .mount(server)
        .await;
}

async fn mock_tag_digest(server: &MockServer, namespace_path: &str, tag: &str, digest: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/v2/repositories/{}/tags/{}", namespace_path, tag)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": tag, "digest": digest})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn scenario_1_version_update_v_prefix_preserved() {
    let server = MockServer::start().await;
    mock_tags(&server, "library/nginx", &["1.19.0", "1.20.0", "1.20.1", "1.21.0", "latest"]).await;
    let gateway = RegistryGateway::with_bases(server.uri(), "unused");

    let decision = check_for_update(
        &gateway,
        None,
        "nginx:1.20.0",
        common::version_strategy(),
        "default",
        &[],
        None,
    )
    .await;

    assert_eq!(decision.new_image.as_deref(), Some("nginx:1.21.0"));
    assert!(decision.reason.contains("Found newer version"));
}

#[tokio::test]
async fn scenario_2_version_lock_major_never_crosses_major() {
    let server = MockServer::start().await;
    mock_tags(
        &server,
        "library/nginx",
        &["1.19.0", "1.20.0", "1.20.1", "1.21.0", "2.0.0"],
    )
    .await;
    let gateway = RegistryGateway::with_bases(server.uri(), "unused");

    let decision = check_for_update(
        &gateway,
        None,
        "nginx:1.20.0",
        common::version_lock_major_strategy(),
        "default",
        &[],
        None,
    )
    .await;

    assert_eq!(decision.new_image.as_deref(), Some("nginx:1.21.0"));
    assert_ne!(decision.new_image.as_deref(), Some("nginx:2.0.0"));
}

#[tokio::test]
async fn scenario_3_no_update_when_already_at_max() {
    let server = MockServer::start().await;
    mock_tags(&server, "library/nginx", &["1.19.0", "1.20.0", "1.21.0"]).await;
    let gateway = RegistryGateway::with_bases(server.uri(), "unused");

    let decision = check_for_update(
        &gateway,
        None,
        "nginx:1.21.0",
        common::version_strategy(),
        "default",
        &[],
        None,
    )
    .await;

    assert_eq!(decision.new_image, None);
    assert_eq!(decision.reason, "No newer version available");
}

#[tokio::test]
async fn scenario_4_latest_strategy_digest_drift() {
    let server = MockServer::start().await;
    mock_tag_digest(&server, "library/nginx", "latest", "sha256:NEW").await;
    let gateway = RegistryGateway::with_bases(server.uri(), "unused");

    let decision = check_for_update(
        &gateway,
        None,
        "nginx:latest@sha256:OLD",
        common::latest_strategy(),
        "default",
        &[],
        None,
    )
    .await;

    assert_eq!(decision.new_image.as_deref(), Some("nginx:latest@sha256:OLD"));
    assert_eq!(decision.current_digest.as_deref(), Some("sha256:OLD"));
    assert_eq!(decision.new_digest.as_deref(), Some("sha256:NEW"));
    assert_eq!(decision.reason, "Latest image has been updated");
}

#[tokio::test]
async fn scenario_5_non_semver_tag_with_version_strategy() {
    let server = MockServer::start().await;
    let gateway = RegistryGateway::with_bases(server.uri(), "unused");

    let decision = check_for_update(
        &gateway,
        None,
        "myapp:stable",
        common::version_strategy(),
        "default",
        &[],
        None,
    )
    .await;

    assert_eq!(decision.new_image, None);
    assert_eq!(decision.reason, "Current tag is not a version tag");
}
