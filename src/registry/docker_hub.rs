use crate::models::DockerAuth;
use anyhow::{bail, Result};
use serde::Deserialize;

#[derive(Deserialize)]
struct TagsPage {
    results: Vec<TagInfo>,
}

#[derive(Deserialize)]
struct TagInfo {
    name: String,
    digest: Option<String>,
}

/// Docker Hub folds bare names into the `library` namespace for registry calls
/// only; the persisted `ImageRef` never carries that rewrite (spec.md §3).
fn namespaced(repository: &str) -> String {
    if repository.contains('/') {
        repository.to_string()
    } else {
        format!("library/{}", repository)
    }
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
    let ns = namespaced(repository);
    let url = format!("{}/v2/repositories/{}/tags/?page_size=100", base, ns);
    let resp = apply_auth(client.get(&url), auth).send().await?;
    if !resp.status().is_success() {
        bail!("docker hub tags request returned {}", resp.status());
    }
    let page: TagsPage = resp.json().await?;
    Ok(page.results.into_iter().map(|t| t.name).collect())
}

pub async fn get_digest(
    client: &reqwest::Client,
    base: &str,
    repository: &str,
    tag: &str,
    auth: Option<&DockerAuth>,
) -> Result<Option<String>> {
    let ns = namespaced(repository);
    let url = format!("{}/v2/repositories/{}/tags/{}", base, ns, tag);
    let resp = apply_auth(client.get(&url), auth).send().await?;
    if !resp.status().is_success() {
        bail!("docker hub tag info request returned {}", resp.status());
    }
    let info: TagInfo = resp.json().await?;
    Ok(info.digest)
}
