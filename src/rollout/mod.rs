//! The patch-then-observe state machine: mutates a workload's container image
//! and waits for the cluster to converge, verifying at the pod level.

use crate::models::{WebhookEvent, WebhookEventType};
use crate::notifier::{Notifier, WebhookNotifier};
use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use serde_json::json;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::warn;

const POLL_PERIOD: Duration = Duration::from_secs(5);
const POLL_BUDGET: Duration = Duration::from_secs(300);
const GENERATION_RETRY_PERIOD: Duration = Duration::from_secs(2);

/// Patch `name` in `namespace` to `new_image_ref` and wait for the rollout to
/// converge. `previous_image` feeds the audit annotation and the STARTED
/// event; the authoritative previous image is re-read from the API.
pub async fn update_deployment(
    client: &Client,
    notifier: &WebhookNotifier,
    namespace: &str,
    name: &str,
    new_image_ref: &str,
    previous_image: &str,
) -> Result<()> {
    let api: Api<Deployment> = Api::namespaced(client.clone(), namespace);

    let prepared = match fetch_current(&api, namespace, name, new_image_ref).await {
        Ok(None) => return Ok(()),
        Ok(Some(prepared)) => prepared,
        Err(err) => {
            notify_failed(notifier, namespace, name, new_image_ref, &err).await;
            return Err(err);
        },
    };

    let mut started_details = HashMap::new();
    started_details.insert("previousImage".to_string(), json!(prepared.actual_current_image));
    notifier
        .send(&WebhookEvent::new(
            WebhookEventType::ImageRolloutStarted,
            namespace,
            name,
            new_image_ref,
            started_details,
        ))
        .await;

    let result = patch_and_observe(
        &api,
        client,
        namespace,
        name,
        &prepared.container_name,
        new_image_ref,
        previous_image,
    )
    .await;

    match result {
        Ok(RolloutOutcome::Completed { elapsed_ms }) => {
            crate::metrics::ROLLOUTS_TOTAL.with_label_values(&["completed"]).inc();
            let mut details = HashMap::new();
            details.insert("rolloutDuration".to_string(), json!(format!("{}ms", elapsed_ms)));
            notifier
                .send(&WebhookEvent::new(
                    WebhookEventType::ImageRolloutCompleted,
                    namespace,
                    name,
                    new_image_ref,
                    details,
                ))
                .await;
            Ok(())
        },
        Ok(RolloutOutcome::TimedOut) => {
            crate::metrics::ROLLOUTS_TOTAL.with_label_values(&["timed_out"]).inc();
            warn!(namespace, name, "rollout did not converge within the poll budget");
            Ok(())
        },
        Err(err) => {
            notify_failed(notifier, namespace, name, new_image_ref, &err).await;
            Err(err)
        },
    }
}

struct PreparedRollout {
    actual_current_image: String,
    container_name: String,
}

/// Re-fetch the workload and validate it's patchable. `Ok(None)` means the
/// container already runs `new_image_ref` (step 2's idempotence check) and
/// the caller should return without patching or notifying anything.
async fn fetch_current(
    api: &Api<Deployment>,
    namespace: &str,
    name: &str,
    new_image_ref: &str,
) -> Result<Option<PreparedRollout>> {
    let deployment = api
        .get(name)
        .await
        .map_err(|_| anyhow!("workload {}/{} not found", namespace, name))?;

    let containers = deployment
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .map(|ps| ps.containers.as_slice())
        .unwrap_or(&[]);
    if containers.is_empty() {
        bail!("workload {}/{} has no containers", namespace, name);
    }

    let actual_current_image = containers[0].image.clone().unwrap_or_default();
    let container_name = containers[0].name.clone();

    if actual_current_image == new_image_ref {
        return Ok(None);
    }

    Ok(Some(PreparedRollout { actual_current_image, container_name }))
}

/// Emit `IMAGE_ROLLOUT_FAILED` with `details.error`, per spec.md §4.F step 6 /
/// §7: every failure from step 1 onward (not just the patch-and-observe
/// phase) fires this before propagating.
async fn notify_failed(
    notifier: &WebhookNotifier,
    namespace: &str,
    name: &str,
    new_image_ref: &str,
    err: &anyhow::Error,
) {
    crate::metrics::ROLLOUTS_TOTAL.with_label_values(&["failed"]).inc();
    let mut details = HashMap::new();
    details.insert("error".to_string(), json!(err.to_string()));
    notifier
        .send(&WebhookEvent::new(
            WebhookEventType::ImageRolloutFailed,
            namespace,
            name,
            new_image_ref,
            details,
        ))
        .await;
}

enum RolloutOutcome {
    Completed { elapsed_ms: u128 },
    TimedOut,
}

async fn patch_and_observe(
    api: &Api<Deployment>,
    client: &Client,
    namespace: &str,
    name: &str,
    container_name: &str,
    new_image_ref: &str,
    previous_image: &str,
) -> Result<RolloutOutcome> {
    let patch = json!({
        "spec": {
            "template": {
                "spec": {
                    "containers": [
                        { "name": container_name, "image": new_image_ref }
                    ]
                }
            }
        },
        "metadata": {
            "annotations": {
                "watch-cluster.io/last-update": Utc::now().to_rfc3339(),
                "watch-cluster.io/change": format!("{} -> {}", previous_image, new_image_ref),
            }
        }
    });

    api.patch(name, &PatchParams::default(), &Patch::Strategic(patch))
        .await
        .map_err(|err| anyhow!("patch failed: {}", err))?;

    let start = Instant::now();
    let mut next_poll = POLL_PERIOD;
    while start.elapsed() < POLL_BUDGET {
        tokio::time::sleep(next_poll).await;

        match verify_converged(api, client, namespace, name, new_image_ref).await? {
            Convergence::Complete => {
                return Ok(RolloutOutcome::Completed { elapsed_ms: start.elapsed().as_millis() });
            },
            Convergence::GenerationNotObserved => next_poll = GENERATION_RETRY_PERIOD,
            Convergence::NotReady => next_poll = POLL_PERIOD,
        }
    }

    Ok(RolloutOutcome::TimedOut)
}

enum Convergence {
    Complete,
    /// `status.observedGeneration` hasn't caught up to `metadata.generation` yet;
    /// retry sooner than the normal poll period.
    GenerationNotObserved,
    NotReady,
}

async fn verify_converged(
    api: &Api<Deployment>,
    client: &Client,
    namespace: &str,
    name: &str,
    new_image_ref: &str,
) -> Result<Convergence> {
    let deployment = api.get(name).await.map_err(|err| anyhow!("poll failed: {}", err))?;

    let generation = deployment.metadata.generation;
    let observed_generation = deployment.status.as_ref().and_then(|s| s.observed_generation);
    if generation != observed_generation {
        return Ok(Convergence::GenerationNotObserved);
    }

    let status = match &deployment.status {
        Some(s) => s,
        None => return Ok(Convergence::NotReady),
    };
    let conditions = status.conditions.as_deref().unwrap_or(&[]);
    let progressing_ok = conditions
        .iter()
        .any(|c| c.type_ == "Progressing" && c.status == "True" && c.reason.as_deref() == Some("NewReplicaSetAvailable"));
    let available_ok = conditions.iter().any(|c| c.type_ == "Available" && c.status == "True");
    if !progressing_ok || !available_ok {
        return Ok(Convergence::NotReady);
    }

    let spec_replicas = deployment.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let updated = status.updated_replicas.unwrap_or(0);
    let ready = status.ready_replicas.unwrap_or(0);
    let available = status.available_replicas.unwrap_or(0);
    if updated != spec_replicas || ready != spec_replicas || available != spec_replicas {
        return Ok(Convergence::NotReady);
    }

    if verify_pods(client, namespace, &deployment, new_image_ref).await? {
        Ok(Convergence::Complete)
    } else {
        Ok(Convergence::NotReady)
    }
}

async fn verify_pods(
    client: &Client,
    namespace: &str,
    deployment: &Deployment,
    new_image_ref: &str,
) -> Result<bool> {
    let selector = deployment
        .spec
        .as_ref()
        .and_then(|s| s.selector.match_labels.as_ref())
        .cloned()
        .unwrap_or_default();
    if selector.is_empty() {
        return Ok(false);
    }
    let label_selector = selector
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",");

    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let list = pods
        .list(&kube::api::ListParams::default().labels(&label_selector))
        .await
        .map_err(|err| anyhow!("pod list failed: {}", err))?;

    if list.items.is_empty() {
        return Ok(false);
    }

    for pod in &list.items {
        let ready = pod
            .status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .map(|conds| conds.iter().any(|c| c.type_ == "Ready" && c.status == "True"))
            .unwrap_or(false);
        if !ready {
            return Ok(false);
        }
    }

    let any_container_updated = list.items.iter().any(|pod| {
        pod.spec
            .as_ref()
            .map(|s| s.containers.iter().any(|c| c.image.as_deref() == Some(new_image_ref)))
            .unwrap_or(false)
    });

    Ok(any_container_updated)
}
