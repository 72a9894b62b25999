//! Image reference parsing, semver classification and comparison.

use crate::models::ImageRef;
use std::cmp::Ordering;

/// Split `[registry/]repository[:tag][@digest]` into its parts.
///
/// `"nginx"` -> `{registry: None, repository: "nginx", tag: "latest"}`.
/// `"nginx@sha256:..."` -> tag `"latest"`, digest captured.
/// `"host:5000/app"` -> registry `"host:5000"` (the colon triggers promotion).
pub fn parse(s: &str) -> ImageRef {
    let (without_digest, digest) = match s.split_once('@') {
        Some((rest, d)) => (rest, Some(d.to_string())),
        None => (s, None),
    };

    let (registry_and_repo, tag) = match without_digest.rfind('/') {
        Some(slash) => {
            let (left, name_and_tag) = without_digest.split_at(slash);
            let name_and_tag = &name_and_tag[1..]; // drop the '/'
            match name_and_tag.split_once(':') {
                Some((name, tag)) => (format!("{}/{}", left, name), tag.to_string()),
                None => (format!("{}/{}", left, name_and_tag), "latest".to_string()),
            }
        },
        None => match without_digest.split_once(':') {
            Some((name, tag)) => (name.to_string(), tag.to_string()),
            None => (without_digest.to_string(), "latest".to_string()),
        },
    };

    let (registry, repository) = match registry_and_repo.split_once('/') {
        Some((first, rest)) if is_registry_segment(first) => {
            (Some(first.to_string()), rest.to_string())
        },
        _ => (None, registry_and_repo),
    };

    ImageRef {
        registry,
        repository,
        tag,
        digest,
    }
}

fn is_registry_segment(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == "localhost"
}

/// Rebuild a (registry, repository, tag) triple into an image string, ignoring digest.
pub fn build(image: &ImageRef) -> String {
    match &image.registry {
        Some(registry) => format!("{}/{}:{}", registry, image.repository, image.tag),
        None => format!("{}:{}", image.repository, image.tag),
    }
}

/// `^v?\d+\.\d+(\.\d+)?(-.*)?$`
pub fn is_semver_tag(tag: &str) -> bool {
    let without_prerelease = tag.split_once('-').map(|(base, _)| base).unwrap_or(tag);
    let without_v = without_prerelease.strip_prefix('v').unwrap_or(without_prerelease);
    let parts: Vec<&str> = without_v.split('.').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return false;
    }
    parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// Parse a tag into a lazy integer vector: strip leading `v`, discard anything
/// from the first `-` onward, map non-integer components to 0.
pub fn parse_version(tag: &str) -> Vec<i64> {
    let without_prerelease = tag.split_once('-').map(|(base, _)| base).unwrap_or(tag);
    let without_v = without_prerelease.strip_prefix('v').unwrap_or(without_prerelease);
    without_v
        .split('.')
        .map(|part| part.parse::<i64>().unwrap_or(0))
        .collect()
}

/// Component-wise compare with the shorter vector 0-padded: `[1,0] == [1,0,0]`.
pub fn compare(a: &[i64], b: &[i64]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let av = a.get(i).copied().unwrap_or(0);
        let bv = b.get(i).copied().unwrap_or(0);
        match av.cmp(&bv) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

pub fn remove_digest(s: &str) -> String {
    s.split_once('@').map(|(rest, _)| rest.to_string()).unwrap_or_else(|| s.to_string())
}

pub fn add_digest(s: &str, digest: &str) -> String {
    format!("{}@{}", remove_digest(s), digest)
}

/// Whether `tag` carries a leading `v`, so a replacement tag can match the convention.
pub fn has_v_prefix(tag: &str) -> bool {
    tag.starts_with('v')
}

/// Reapply (or drop) a leading `v` on a bare numeric tag to match a source convention.
pub fn normalize_v_prefix(tag: &str, want_v: bool) -> String {
    let bare = tag.strip_prefix('v').unwrap_or(tag);
    if want_v {
        format!("v{}", bare)
    } else {
        bare.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_name_defaults_to_latest() {
        let r = parse("nginx");
        assert_eq!(r.registry, None);
        assert_eq!(r.repository, "nginx");
        assert_eq!(r.tag, "latest");
        assert_eq!(r.digest, None);
    }

    #[test]
    fn parse_strips_digest_and_defaults_tag() {
        let r = parse("nginx@sha256:abcdef");
        assert_eq!(r.registry, None);
        assert_eq!(r.repository, "nginx");
        assert_eq!(r.tag, "latest");
        assert_eq!(r.digest.as_deref(), Some("sha256:abcdef"));
    }

    #[test]
    fn parse_promotes_host_with_port() {
        let r = parse("host:5000/app");
        assert_eq!(r.registry.as_deref(), Some("host:5000"));
        assert_eq!(r.repository, "app");
        assert_eq!(r.tag, "latest");
    }

    #[test]
    fn parse_registry_with_namespace_and_tag() {
        let r = parse("gcr.io/project/image:v1.0");
        assert_eq!(r.registry.as_deref(), Some("gcr.io"));
        assert_eq!(r.repository, "project/image");
        assert_eq!(r.tag, "v1.0");
    }

    #[test]
    fn parse_no_registry_with_namespace() {
        let r = parse("library/nginx:1.21");
        assert_eq!(r.registry, None);
        assert_eq!(r.repository, "library/nginx");
        assert_eq!(r.tag, "1.21");
    }

    #[test]
    fn build_round_trips_strip_digest() {
        for s in ["nginx:1.20.0", "gcr.io/project/image:v1.0", "host:5000/app:latest"] {
            let parsed = parse(s);
            assert_eq!(build(&parsed), remove_digest(s));
        }
    }

    #[test]
    fn semver_tag_classification() {
        assert!(is_semver_tag("1.20.0"));
        assert!(is_semver_tag("v1.20.0"));
        assert!(is_semver_tag("1.20"));
        assert!(is_semver_tag("v1.20-beta"));
        assert!(!is_semver_tag("latest"));
        assert!(!is_semver_tag("stable"));
        assert!(!is_semver_tag("1.20.0.0"));
    }

    #[test]
    fn version_compare_zero_pads_shorter() {
        assert_eq!(compare(&parse_version("1.0"), &parse_version("1.0.0")), Ordering::Equal);
        assert_eq!(
            compare(&parse_version("1.0.0"), &parse_version("1.0.0.0")),
            Ordering::Equal
        );
        assert_eq!(compare(&parse_version("2.0"), &parse_version("1.9.9")), Ordering::Greater);
    }

    #[test]
    fn add_and_remove_digest() {
        assert_eq!(remove_digest("nginx:1.2@sha256:aaa"), "nginx:1.2");
        assert_eq!(add_digest("nginx:1.2", "sha256:aaa"), "nginx:1.2@sha256:aaa");
    }

    #[test]
    fn v_prefix_normalization() {
        assert!(has_v_prefix("v1.2.3"));
        assert!(!has_v_prefix("1.2.3"));
        assert_eq!(normalize_v_prefix("1.2.3", true), "v1.2.3");
        assert_eq!(normalize_v_prefix("v1.2.3", false), "1.2.3");
    }
}
