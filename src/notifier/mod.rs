//! Reliable webhook delivery: retries, exponential backoff, and `Retry-After`
//! honoring, built on a shared `reqwest::Client`.

use crate::models::{WebhookEvent, WebhookEventType};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::time::Duration;
use tracing::error;

const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_RETRY_COUNT: u32 = 3;

#[derive(Debug, Clone, Default)]
pub struct EventGates {
    pub detected: bool,
    pub started: bool,
    pub completed: bool,
    pub failed: bool,
}

impl EventGates {
    fn allows(&self, event_type: WebhookEventType) -> bool {
        match event_type {
            WebhookEventType::DeploymentDetected => self.detected,
            WebhookEventType::ImageRolloutStarted => self.started,
            WebhookEventType::ImageRolloutCompleted => self.completed,
            WebhookEventType::ImageRolloutFailed => self.failed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub url: Option<String>,
    pub timeout_ms: u64,
    pub retry_count: u32,
    pub headers: HashMap<String, String>,
    pub per_event_enabled: EventGates,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retry_count: DEFAULT_RETRY_COUNT,
            headers: HashMap::new(),
            per_event_enabled: EventGates::default(),
        }
    }
}

impl NotifierConfig {
    pub fn from_env() -> Self {
        let url = std::env::var("WEBHOOK_URL").ok().filter(|s| !s.is_empty());
        let timeout_ms = std::env::var("WEBHOOK_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        let retry_count = std::env::var("WEBHOOK_RETRY_COUNT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RETRY_COUNT);
        let headers = std::env::var("WEBHOOK_HEADERS")
            .ok()
            .map(|raw| parse_headers(&raw))
            .unwrap_or_default();
        let per_event_enabled = EventGates {
            detected: env_flag("WEBHOOK_ENABLE_DEPLOYMENT_DETECTED"),
            started: env_flag("WEBHOOK_ENABLE_IMAGE_ROLLOUT_STARTED"),
            completed: env_flag("WEBHOOK_ENABLE_IMAGE_ROLLOUT_COMPLETED"),
            failed: env_flag("WEBHOOK_ENABLE_IMAGE_ROLLOUT_FAILED"),
        };
        Self { url, timeout_ms, retry_count, headers, per_event_enabled }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "true").unwrap_or(false)
}

/// `"k1=v1, k2=v2"` -> map; blanks are skipped, keys/values trimmed.
fn parse_headers(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let pair = pair.trim();
            if pair.is_empty() {
                return None;
            }
            pair.split_once('=').map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

/// The notifier seam. One implementation ships today; kept as a trait, in
/// the teacher's style, so the reconciler and rollout driver depend on the
/// capability rather than the concrete HTTP delivery mechanism.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, event: &WebhookEvent);
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    config: NotifierConfig,
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, event: &WebhookEvent) {
        self.deliver(event).await
    }
}

impl WebhookNotifier {
    pub fn new(config: NotifierConfig) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("reqwest client builds with static config");
        Self { client, config }
    }

    /// Deliver `event`, retrying per the configured budget. Never returns an
    /// error to the caller; failures are logged and swallowed.
    async fn deliver(&self, event: &WebhookEvent) {
        let Some(url) = self.config.url.as_ref().filter(|u| !u.is_empty()) else {
            return;
        };
        if !self.config.per_event_enabled.allows(event.event_type) {
            return;
        }

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let body = match serde_json::to_vec(event) {
            Ok(b) => b,
            Err(err) => {
                error!(%err, "failed to serialize webhook event");
                return;
            },
        };

        for attempt in 0..self.config.retry_count {
            let mut request = self
                .client
                .post(url)
                .timeout(timeout)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
            for (k, v) in &self.config.headers {
                request = request.header(k, v);
            }

            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    crate::metrics::WEBHOOK_DELIVERIES_TOTAL.with_label_values(&["success"]).inc();
                    return;
                },
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let retry_after = resp
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok());
                    match retry_after {
                        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                        None => tokio::time::sleep(backoff(attempt)).await,
                    }
                },
                Ok(_) => {
                    tokio::time::sleep(backoff(attempt)).await;
                },
                Err(_) => {
                    tokio::time::sleep(backoff(attempt)).await;
                },
            }
        }

        crate::metrics::WEBHOOK_DELIVERIES_TOTAL.with_label_values(&["failed"]).inc();
        error!(
            event = ?event.event_type,
            url,
            attempts = self.config.retry_count,
            "webhook delivery failed after exhausting retry budget"
        );
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(1000 * (attempt as u64 + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_parsing_trims_and_skips_blanks() {
        let parsed = parse_headers("a=1,  b = 2 , , c=3");
        assert_eq!(parsed.get("a"), Some(&"1".to_string()));
        assert_eq!(parsed.get("b"), Some(&"2".to_string()));
        assert_eq!(parsed.get("c"), Some(&"3".to_string()));
        assert_eq!(parsed.len(), 3);
    }

    #[test]
    fn gate_defaults_to_all_disabled() {
        let gates = EventGates::default();
        assert!(!gates.allows(WebhookEventType::DeploymentDetected));
        assert!(!gates.allows(WebhookEventType::ImageRolloutFailed));
    }

    #[test]
    fn backoff_grows_linearly_with_attempt() {
        assert_eq!(backoff(0), Duration::from_millis(1000));
        assert_eq!(backoff(2), Duration::from_millis(3000));
    }
}
