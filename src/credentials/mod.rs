//! Locates and decodes `kubernetes.io/dockerconfigjson` secrets for the
//! registry implied by an image reference.

use crate::models::{DockerAuth, ImageRef};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use serde::Deserialize;
use tracing::debug;

const DOCKERCONFIGJSON_TYPE: &str = "kubernetes.io/dockerconfigjson";
const DEFAULT_REGISTRY: &str = "index.docker.io";

#[derive(Deserialize)]
struct DockerConfigJson {
    auths: std::collections::HashMap<String, AuthEntry>,
}

#[derive(Deserialize)]
struct AuthEntry {
    auth: Option<String>,
}

/// Try each secret in order; the first one that yields credentials for
/// `image`'s effective registry wins. Any failure along the way just moves to
/// the next secret.
pub async fn resolve_credentials(
    client: &Client,
    namespace: &str,
    image_pull_secrets: &[String],
    image: &ImageRef,
) -> Option<DockerAuth> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    for name in image_pull_secrets {
        let secret = match secrets.get(name).await {
            Ok(s) => s,
            Err(err) => {
                debug!(secret = %name, %err, "could not fetch image pull secret");
                continue;
            },
        };
        if let Some(auth) = decode_secret(&secret, image) {
            return Some(auth);
        }
    }
    None
}

fn decode_secret(secret: &Secret, image: &ImageRef) -> Option<DockerAuth> {
    if secret.type_.as_deref() != Some(DOCKERCONFIGJSON_TYPE) {
        return None;
    }
    let data = secret.data.as_ref()?;
    let raw = data.get(".dockerconfigjson")?;
    let parsed: DockerConfigJson = serde_json::from_slice(&raw.0).ok()?;
    decode_config(&parsed, image)
}

fn decode_config(config: &DockerConfigJson, image: &ImageRef) -> Option<DockerAuth> {
    let registry = image.registry.as_deref().unwrap_or(DEFAULT_REGISTRY);
    let candidates: Vec<&str> = if registry == DEFAULT_REGISTRY {
        vec![
            DEFAULT_REGISTRY,
            "https://index.docker.io/v1/",
            "docker.io",
            "https://docker.io",
        ]
    } else {
        vec![registry]
    };

    for candidate in candidates {
        if let Some(entry) = config.auths.get(candidate) {
            if let Some(auth) = decode_auth_entry(entry) {
                return Some(auth);
            }
        }
    }
    None
}

fn decode_auth_entry(entry: &AuthEntry) -> Option<DockerAuth> {
    let encoded = entry.auth.as_ref()?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (username, password) = text.split_once(':')?;
    Some(DockerAuth {
        username: username.to_string(),
        password: password.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(registry: Option<&str>) -> ImageRef {
        ImageRef {
            registry: registry.map(str::to_string),
            repository: "app".to_string(),
            tag: "latest".to_string(),
            digest: None,
        }
    }

    fn config_with(entries: &[(&str, &str)]) -> DockerConfigJson {
        let mut auths = std::collections::HashMap::new();
        for (url, user_pass) in entries {
            let encoded = STANDARD.encode(user_pass.as_bytes());
            auths.insert(url.to_string(), AuthEntry { auth: Some(encoded) });
        }
        DockerConfigJson { auths }
    }

    #[test]
    fn resolves_docker_hub_alias_when_registry_absent() {
        let config = config_with(&[("https://index.docker.io/v1/", "alice:secret")]);
        let auth = decode_config(&config, &image(None)).unwrap();
        assert_eq!(auth.username, "alice");
        assert_eq!(auth.password, "secret");
    }

    #[test]
    fn resolves_exact_registry_match() {
        let config = config_with(&[("ghcr.io", "bob:token")]);
        let auth = decode_config(&config, &image(Some("ghcr.io"))).unwrap();
        assert_eq!(auth.username, "bob");
    }

    #[test]
    fn missing_entry_yields_none() {
        let config = config_with(&[("quay.io", "carol:pw")]);
        assert!(decode_config(&config, &image(Some("ghcr.io"))).is_none());
    }

    #[test]
    fn malformed_base64_is_skipped() {
        let entry = AuthEntry { auth: Some("not-base64!!".to_string()) };
        assert!(decode_auth_entry(&entry).is_none());
    }
}
