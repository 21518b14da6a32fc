//! Local artifact archive lookup.
//!
//! Builds can run against a pre-seeded directory of artifacts from an
//! earlier run. The [`ArchiveIndex`] trait is the seam the tracked
//! content handlers consume; [`DirArchive`] is the directory-backed
//! implementation. Fetching and unpacking the archive itself happens
//! outside this process.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;

#[async_trait]
pub trait ArchiveIndex: Send + Sync {
    /// Whether the archive holds a regular file for this path.
    async fn contains(&self, path: &str) -> bool;

    /// Open the archived file for streaming; `None` when absent.
    async fn fetch(&self, path: &str) -> Option<File>;
}

/// Archive rooted at a local directory, laid out exactly like the
/// repository paths that reference it.
pub struct DirArchive {
    root: PathBuf,
}

impl DirArchive {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = path.trim_start_matches('/');
        // Reject traversal; archive paths are always plain descendants.
        if Path::new(relative)
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return None;
        }
        Some(self.root.join(relative))
    }
}

#[async_trait]
impl ArchiveIndex for DirArchive {
    async fn contains(&self, path: &str) -> bool {
        if should_proxy(path) {
            return false;
        }
        let Some(candidate) = self.resolve(path) else {
            return false;
        };
        tokio::fs::metadata(&candidate)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn fetch(&self, path: &str) -> Option<File> {
        let candidate = self.resolve(path)?;
        File::open(candidate).await.ok()
    }
}

/// Repository metadata must always come from the live upstream: archived
/// copies go stale the moment a new version is published.
#[must_use]
pub fn should_proxy(path: &str) -> bool {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    file_name.starts_with("maven-metadata.xml")
}
