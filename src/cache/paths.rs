//! Cache placement - one shared root, one document per repository
//!
//! The cache root lives under the platform cache directory
//! (`~/.cache/revchron/` on Unix, `%LOCALAPPDATA%/revchron/` on Windows).
//! A small `repositories.json` index maps repository identities to their
//! line-count documents so several checkouts can share the root without
//! collision.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// File name of the per-root repository index.
pub const INDEX_FILE: &str = "repositories.json";

/// Resolve the cache root, honoring a configured override.
pub fn cache_root(override_root: Option<&Path>) -> PathBuf {
    if let Some(root) = override_root {
        return root.to_path_buf();
    }

    let base = if cfg!(windows) {
        std::env::var("LOCALAPPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".")))
    } else {
        dirs::cache_dir().unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".cache"))
                .unwrap_or_else(|| PathBuf::from("."))
        })
    };

    base.join("revchron")
}

/// Index of repository identity -> document file name within one cache root.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RepositoryIndex {
    repositories: BTreeMap<String, String>,
}

impl RepositoryIndex {
    /// Load the index, starting empty when missing or unreadable.
    pub fn load(root: &Path) -> Self {
        let path = root.join(INDEX_FILE);
        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Discarding unreadable index {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        fs::create_dir_all(root)
            .with_context(|| format!("Failed to create cache root {}", root.display()))?;
        let path = root.join(INDEX_FILE);
        let json = serde_json::to_string_pretty(self).context("Failed to serialize index")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write index {}", path.display()))?;
        Ok(())
    }

    /// Document path for a repository, registering it on first use.
    pub fn document_for(&mut self, root: &Path, repository_id: &str) -> PathBuf {
        let file = self
            .repositories
            .entry(repository_id.to_string())
            .or_insert_with(|| format!("linecounts-{}.json", repository_id))
            .clone();
        root.join(file)
    }

    /// Known document file name for a repository, if any.
    pub fn get(&self, repository_id: &str) -> Option<&str> {
        self.repositories.get(repository_id).map(|s| s.as_str())
    }

    pub fn remove(&mut self, repository_id: &str) -> Option<String> {
        self.repositories.remove(repository_id)
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    /// All (repository id, document file name) pairs.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.repositories
            .iter()
            .map(|(id, file)| (id.as_str(), file.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn override_wins_over_platform_dir() {
        let root = cache_root(Some(Path::new("/tmp/custom-cache")));
        assert_eq!(root, PathBuf::from("/tmp/custom-cache"));
    }

    #[test]
    fn default_root_is_named_revchron() {
        let root = cache_root(None);
        assert!(root.to_string_lossy().contains("revchron"));
    }

    #[test]
    fn index_round_trip_and_stable_documents() {
        let dir = tempdir().unwrap();
        let mut index = RepositoryIndex::load(dir.path());
        assert!(index.is_empty());

        let doc_a = index.document_for(dir.path(), "repo-abc123");
        let doc_b = index.document_for(dir.path(), "repo-abc123");
        assert_eq!(doc_a, doc_b);
        index.save(dir.path()).unwrap();

        let mut reloaded = RepositoryIndex::load(dir.path());
        assert_eq!(reloaded.document_for(dir.path(), "repo-abc123"), doc_a);
        assert_eq!(reloaded.get("repo-abc123"), Some("linecounts-repo-abc123.json"));
    }

    #[test]
    fn distinct_repositories_get_distinct_documents() {
        let dir = tempdir().unwrap();
        let mut index = RepositoryIndex::load(dir.path());
        let a = index.document_for(dir.path(), "repo-a");
        let b = index.document_for(dir.path(), "repo-b");
        assert_ne!(a, b);
    }
}
