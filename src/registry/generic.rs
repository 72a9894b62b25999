use crate::models::DockerAuth;
use anyhow::{bail, Result};
use serde::Deserialize;

const MANIFEST_ACCEPT: &str = "application/vnd.docker.distribution.manifest.v2+json";

#[derive(Deserialize)]
struct TagsList {
    tags: Vec<String>,
}

fn apply_auth(builder: reqwest::RequestBuilder, auth: Option<&DockerAuth>) -> reqwest::RequestBuilder {
    match auth {
        Some(a) => builder.basic_auth(&a.username, Some(&a.password)),
        None => builder,
    }
}

pub async fn get_tags(
    client: &reqwest::Client,
    base: &str,
    repository: &str,
    auth: Option<&DockerAuth>,
) -> Result<Vec<String>> {
    let url = format!("{}/v2/{}/tags/list", base, repository);
    let resp = apply_auth(client.get(&url), auth).send().await?;
    if !resp.status().is_success() {
        bail!("generic OCI tags request returned {}", resp.status());
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
    let url = format!("{}/v2/{}/manifests/{}", base, repository, tag);
    let resp = apply_auth(client.get(&url), auth)
        .header(reqwest::header::ACCEPT, MANIFEST_ACCEPT)
        .send()
        .await?;
    if !resp.status().is_success() {
        bail!("generic OCI manifest request returned {}", resp.status());
    }
    let digest = resp
        .headers()
        .get("Docker-Content-Digest")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    Ok(digest)
}
