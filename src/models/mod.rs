use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A parsed `[registry/]repository[:tag][@digest]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub registry: Option<String>,
    pub repository: String,
    pub tag: String,
    pub digest: Option<String>,
}

/// How a workload wants updates evaluated. Default is `Version { lock_major: false }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStrategy {
    Version { lock_major: bool },
    Latest,
}

impl Default for UpdateStrategy {
    fn default() -> Self {
        UpdateStrategy::Version { lock_major: false }
    }
}

impl UpdateStrategy {
    pub fn from_annotation(value: &str) -> Self {
        match value {
            "version-lock-major" => UpdateStrategy::Version { lock_major: true },
            "latest" => UpdateStrategy::Latest,
            _ => UpdateStrategy::Version { lock_major: false },
        }
    }
}

/// A workload the reconciler has opted in to watch.
#[derive(Debug, Clone)]
pub struct SupervisedWorkload {
    pub namespace: String,
    pub name: String,
    pub cron_expr: String,
    pub strategy: UpdateStrategy,
    /// Cached container[0] image. Refreshed right after a successful rollout,
    /// never from the watcher alone.
    pub current_image: String,
    pub image_pull_secrets: Vec<String>,
    pub last_checked: Option<DateTime<Utc>>,
}

impl SupervisedWorkload {
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn make_key(namespace: &str, name: &str) -> String {
        format!("{}/{}", namespace, name)
    }
}

/// Outcome of the Update-Decision Engine for one supervised workload.
#[derive(Debug, Clone)]
pub struct UpdateDecision {
    pub current_image: String,
    pub new_image: Option<String>,
    pub reason: String,
    pub current_digest: Option<String>,
    pub new_digest: Option<String>,
}

impl UpdateDecision {
    pub fn no_update(current_image: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            current_image: current_image.into(),
            new_image: None,
            reason: reason.into(),
            current_digest: None,
            new_digest: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookEventType {
    DeploymentDetected,
    ImageRolloutStarted,
    ImageRolloutCompleted,
    ImageRolloutFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRef {
    pub namespace: String,
    pub name: String,
    pub image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "eventType")]
    pub event_type: WebhookEventType,
    pub timestamp: DateTime<Utc>,
    pub deployment: DeploymentRef,
    pub details: HashMap<String, serde_json::Value>,
}

impl WebhookEvent {
    pub fn new(
        event_type: WebhookEventType,
        namespace: impl Into<String>,
        name: impl Into<String>,
        image: impl Into<String>,
        details: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            deployment: DeploymentRef {
                namespace: namespace.into(),
                name: name.into(),
                image: image.into(),
            },
            details,
        }
    }
}

/// Credentials decoded from a `kubernetes.io/dockerconfigjson` secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerAuth {
    pub username: String,
    pub password: String,
}

/// Annotation keys read from / written to supervised workloads.
pub mod annotations {
    pub const ENABLED: &str = "watch-cluster.io/enabled";
    pub const CRON: &str = "watch-cluster.io/cron";
    pub const STRATEGY: &str = "watch-cluster.io/strategy";
    pub const LAST_UPDATE: &str = "watch-cluster.io/last-update";
    pub const CHANGE: &str = "watch-cluster.io/change";

    pub const DEFAULT_CRON: &str = "0 */5 * * * ?";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_defaults_to_unlocked_version() {
        assert_eq!(
            UpdateStrategy::default(),
            UpdateStrategy::Version { lock_major: false }
        );
    }

    #[test]
    fn strategy_from_annotation() {
        assert_eq!(
            UpdateStrategy::from_annotation("version-lock-major"),
            UpdateStrategy::Version { lock_major: true }
        );
        assert_eq!(UpdateStrategy::from_annotation("latest"), UpdateStrategy::Latest);
        assert_eq!(
            UpdateStrategy::from_annotation("bogus"),
            UpdateStrategy::Version { lock_major: false }
        );
    }

    #[test]
    fn workload_key_format() {
        assert_eq!(SupervisedWorkload::make_key("ns", "app"), "ns/app");
    }
}
