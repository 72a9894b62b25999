//! Given a current image reference and a strategy, decides whether an update
//! is warranted and what the target reference is.

use crate::credentials;
use crate::image;
use crate::models::{DockerAuth, ImageRef, UpdateDecision, UpdateStrategy};
use crate::registry::RegistryGateway;
use kube::Client;
use std::cmp::Ordering;

/// `spec_image` is the workload's current `containers[0].image` as the API
/// server reports it (may carry a `@digest` suffix); it is the source of
/// truth for the current digest under the `Latest` strategy.
pub async fn check_for_update(
    gateway: &RegistryGateway,
    kube_client: Option<&Client>,
    current_image: &str,
    strategy: UpdateStrategy,
    namespace: &str,
    image_pull_secrets: &[String],
    spec_image: Option<&str>,
) -> UpdateDecision {
    let parsed = image::parse(current_image);

    let auth = if !image_pull_secrets.is_empty() {
        match kube_client {
            Some(client) => {
                credentials::resolve_credentials(client, namespace, image_pull_secrets, &parsed).await
            },
            None => None,
        }
    } else {
        None
    };

    match strategy {
        UpdateStrategy::Version { lock_major } => {
            check_version(gateway, &parsed, current_image, lock_major, auth.as_ref()).await
        },
        UpdateStrategy::Latest => {
            check_latest(gateway, &parsed, current_image, spec_image, auth.as_ref()).await
        },
    }
}

async fn check_version(
    gateway: &RegistryGateway,
    parsed: &ImageRef,
    current_image: &str,
    lock_major: bool,
    auth: Option<&DockerAuth>,
) -> UpdateDecision {
    if !image::is_semver_tag(&parsed.tag) {
        return UpdateDecision::no_update(current_image, "Current tag is not a version tag");
    }

    let current_version = image::parse_version(&parsed.tag);
    let current_major = current_version.first().copied().unwrap_or(0);
    let want_v = image::has_v_prefix(&parsed.tag);

    let tags = gateway
        .get_tags(parsed.registry.as_deref(), &parsed.repository, auth)
        .await;

    let mut candidates: Vec<(Vec<i64>, String)> = tags
        .into_iter()
        .filter(|t| image::is_semver_tag(t))
        .map(|t| (image::parse_version(&t), t))
        .filter(|(v, _)| image::compare(v, &current_version) == Ordering::Greater)
        .filter(|(v, _)| !lock_major || v.first().copied().unwrap_or(0) == current_major)
        .collect();

    candidates.sort_by(|a, b| image::compare(&b.0, &a.0));

    let Some((_, winning_tag)) = candidates.into_iter().next() else {
        let reason = if lock_major {
            format!("No newer version available within major version {}", current_major)
        } else {
            "No newer version available".to_string()
        };
        return UpdateDecision::no_update(current_image, reason);
    };

    let new_tag = image::normalize_v_prefix(&winning_tag, want_v);
    let new_image_ref = ImageRef {
        registry: parsed.registry.clone(),
        repository: parsed.repository.clone(),
        tag: new_tag.clone(),
        digest: None,
    };
    let new_image = image::build(&new_image_ref);

    let current_digest = gateway
        .get_image_digest(parsed.registry.as_deref(), &parsed.repository, &parsed.tag, auth)
        .await;
    let new_digest = gateway
        .get_image_digest(parsed.registry.as_deref(), &parsed.repository, &new_tag, auth)
        .await;

    UpdateDecision {
        current_image: current_image.to_string(),
        new_image: Some(new_image),
        reason: format!("Found newer version: {}", new_tag),
        current_digest,
        new_digest,
    }
}

async fn check_latest(
    gateway: &RegistryGateway,
    parsed: &ImageRef,
    current_image: &str,
    spec_image: Option<&str>,
    auth: Option<&DockerAuth>,
) -> UpdateDecision {
    if image::is_semver_tag(&parsed.tag) {
        return UpdateDecision::no_update(current_image, "Use version strategy for version tags");
    }

    let new_digest = gateway
        .get_image_digest(parsed.registry.as_deref(), &parsed.repository, &parsed.tag, auth)
        .await;

    let current_digest = spec_image
        .and_then(extract_digest)
        .or_else(|| extract_digest(current_image));

    match (&current_digest, &new_digest) {
        (Some(old), Some(new)) if old != new => {
            let reason = if parsed.tag == "latest" {
                "Latest image has been updated".to_string()
            } else {
                format!("Tag '{}' has been updated", parsed.tag)
            };
            UpdateDecision {
                current_image: current_image.to_string(),
                new_image: Some(current_image.to_string()),
                reason,
                current_digest,
                new_digest,
            }
        },
        _ => UpdateDecision {
            current_image: current_image.to_string(),
            new_image: None,
            reason: "Already using the latest image".to_string(),
            current_digest,
            new_digest,
        },
    }
}

fn extract_digest(s: &str) -> Option<String> {
    s.split_once('@').map(|(_, d)| d.to_string())
}
