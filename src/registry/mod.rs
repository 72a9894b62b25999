//! Fetches tag lists and per-tag digests from upstream image registries,
//! dispatching to registry-specific wire formats.

mod docker_hub;
mod generic;
mod ghcr;

use crate::models::DockerAuth;
use std::time::Duration;
use tracing::warn;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const DOCKER_HUB_BASE: &str = "https://hub.docker.com";
const GHCR_BASE: &str = "https://ghcr.io";

/// Which wire protocol a registry host speaks.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Strategy {
    DockerHub,
    Ghcr,
    Generic { host: String },
}

fn dispatch(registry: Option<&str>) -> Strategy {
    match registry {
        None => Strategy::DockerHub,
        Some(r) if r == "docker.io" => Strategy::DockerHub,
        Some(r) if r.contains("ghcr.io") => Strategy::Ghcr,
        Some(r) => Strategy::Generic { host: r.to_string() },
    }
}

/// Thin wrapper over a shared `reqwest::Client`, one per controller process.
/// The registry base URLs are overridable so tests can point them at a local
/// mock server; production always uses the real hosts.
#[derive(Clone)]
pub struct RegistryGateway {
    client: reqwest::Client,
    docker_hub_base: String,
    ghcr_base: String,
}

impl Default for RegistryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryGateway {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(HTTP_TIMEOUT)
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("reqwest client builds with static config");
        Self {
            client,
            docker_hub_base: DOCKER_HUB_BASE.to_string(),
            ghcr_base: GHCR_BASE.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_bases(docker_hub_base: impl Into<String>, ghcr_base: impl Into<String>) -> Self {
        let mut gateway = Self::new();
        gateway.docker_hub_base = docker_hub_base.into();
        gateway.ghcr_base = ghcr_base.into();
        gateway
    }

    /// List every tag known to the registry for `repository`. Never fatal:
    /// any failure logs and returns an empty list.
    pub async fn get_tags(
        &self,
        registry: Option<&str>,
        repository: &str,
        auth: Option<&DockerAuth>,
    ) -> Vec<String> {
        let result = match dispatch(registry) {
            Strategy::DockerHub => {
                docker_hub::get_tags(&self.client, &self.docker_hub_base, repository, auth).await
            },
            Strategy::Ghcr => ghcr::get_tags(&self.client, &self.ghcr_base, repository, auth).await,
            Strategy::Generic { host } => {
                let base = format!("https://{}", host);
                generic::get_tags(&self.client, &base, repository, auth).await
            },
        };
        match result {
            Ok(tags) => {
                crate::metrics::REGISTRY_CALLS_TOTAL.with_label_values(&["success"]).inc();
                tags
            },
            Err(err) => {
                crate::metrics::REGISTRY_CALLS_TOTAL.with_label_values(&["error"]).inc();
                warn!(repository, %err, "registry tag listing failed");
                Vec::new()
            },
        }
    }

    /// Resolve the content digest for one tag. Never fatal: failures return `None`.
    pub async fn get_image_digest(
        &self,
        registry: Option<&str>,
        repository: &str,
        tag: &str,
        auth: Option<&DockerAuth>,
    ) -> Option<String> {
        let result = match dispatch(registry) {
            Strategy::DockerHub => {
                docker_hub::get_digest(&self.client, &self.docker_hub_base, repository, tag, auth).await
            },
            Strategy::Ghcr => ghcr::get_digest(&self.client, &self.ghcr_base, repository, tag, auth).await,
            Strategy::Generic { host } => {
                let base = format!("https://{}", host);
                generic::get_digest(&self.client, &base, repository, tag, auth).await
            },
        };
        match result {
            Ok(digest) => {
                crate::metrics::REGISTRY_CALLS_TOTAL.with_label_values(&["success"]).inc();
                digest
            },
            Err(err) => {
                crate::metrics::REGISTRY_CALLS_TOTAL.with_label_values(&["error"]).inc();
                warn!(repository, tag, %err, "registry digest lookup failed");
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_defaults_to_docker_hub() {
        assert_eq!(dispatch(None), Strategy::DockerHub);
        assert_eq!(dispatch(Some("docker.io")), Strategy::DockerHub);
    }

    #[test]
    fn dispatch_matches_ghcr_by_substring() {
        assert_eq!(dispatch(Some("ghcr.io")), Strategy::Ghcr);
    }

    #[test]
    fn dispatch_falls_back_to_generic() {
        assert_eq!(
            dispatch(Some("quay.io")),
            Strategy::Generic { host: "quay.io".to_string() }
        );
    }
}
