use crate::models::DockerAuth;
use anyhow::{bail, Result};
use serde::Deserialize;

const MANIFEST_ACCEPT: &str = concat!(
    "application/vnd.docker.distribution.manifest.v2+json, ",
    "application/vnd.docker.distribution.manifest.list.v2+json, ",
    "application/vnd.oci.image.manifest.v1+json, ",
    "application/vnd.oci.image.index.v1+json"
);

#[derive(Deserialize)]
struct TagsList {
    tags: Vec<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

async fn bearer_token(
    client: &reqwest::Client,
    base: &str,
    repository: &str,
    auth: Option<&DockerAuth>,
) -> Result<String> {
    if let Some(a) = auth {
        return Ok(a.password.clone());
    }
    let url = format!("{}/token?scope=repository:{}:pull", base, repository);
    let resp = client.get(&url).send().await?;
    if !resp.status().is_success() {
        bail!("ghcr token mint returned {}", resp.status());
    }
    let parsed: TokenResponse = resp.json().await?;
    Ok(parsed.token)
}

pub async fn get_tags(
    client: &reqwest::Client,
    base: &str,
    repository: &str,
    auth: Option<&DockerAuth>,
) -> Result<Vec<String>> {
    let token = bearer_token(client, base, repository, auth).await?;
    let url = format!("{}/v2/{}/tags/list", base, repository);
    let resp = client.get(&url).bearer_auth(token).send().await?;
    if !resp.status().is_success() {
        bail!("ghcr tags request returned {}", resp.status());
    }
    let parsed: TagsList = resp.json().await?;
    Ok(parsed.tags)
}

pub async fn get_digest(
    client: &reqwest::Client,
    base: &str,
    repository: &str,
    tag: &str,
    auth: Option<&DockerAuth>,
) -> Result<Option<String>> {
    let token = bearer_token(client, base, repository, auth).await?;
    let url = format!("{}/v2/{}/manifests/{}", base, repository, tag);
    let resp = client
        .get(&url)
        .bearer_auth(token)
        .header(reqwest::header::ACCEPT, MANIFEST_ACCEPT)
        .send()
        .await?;
    if !resp.status().is_success() {
        bail!("ghcr manifest request returned {}", resp.status());
    }
    let digest = resp
        .headers()
        .get("Docker-Content-Digest")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    Ok(digest)
}
