//! Shared fixtures for cross-cutting scenario tests.

use watchcluster::models::{ImageRef, UpdateStrategy};

pub fn version_strategy() -> UpdateStrategy {
    UpdateStrategy::Version { lock_major: false }
}

pub fn version_lock_major_strategy() -> UpdateStrategy {
    UpdateStrategy::Version { lock_major: true }
}

pub fn latest_strategy() -> UpdateStrategy {
    UpdateStrategy::Latest
}

pub fn parsed(image: &str) -> ImageRef {
    watchcluster::image::parse(image)
}
