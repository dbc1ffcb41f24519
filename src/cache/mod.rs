//! Persistent line-count cache
//!
//! External diff calls are the expensive part of a run, so every resolved
//! (path, revision) pair is remembered in a durable JSON tree document, one
//! per repository. A subsequent run against the same checkout resolves from
//! the document and issues no external calls for work already done.

pub mod paths;

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Bumped when the document layout changes; a mismatched document is
/// discarded instead of misread.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Resolved counts for one (path, revision) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDelta {
    pub added: u64,
    pub removed: u64,
    pub binary: bool,
}

/// Everything the cache knows about one path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathCounts {
    /// Entries are authoritative only up to this revision: a lookup for a
    /// newer revision must go back to the external tool.
    pub as_of_revision: u64,
    /// Most recent binary-status observation for the path.
    pub binary: bool,
    pub revisions: BTreeMap<u64, LineDelta>,
}

/// Durable mapping from (path, revision) to resolved line counts.
#[derive(Debug, Serialize, Deserialize)]
pub struct LineCountCache {
    version: u32,
    paths: BTreeMap<String, PathCounts>,
}

impl Default for LineCountCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LineCountCache {
    pub fn new() -> Self {
        Self {
            version: CACHE_FORMAT_VERSION,
            paths: BTreeMap::new(),
        }
    }

    /// Look up resolved counts. A hit requires both the revision entry and
    /// an `as_of_revision` at or past the requested revision; knowing a path
    /// only up to r40 says nothing about r45.
    pub fn lookup(&self, path: &str, revision: u64) -> Option<LineDelta> {
        let counts = self.paths.get(path)?;
        if counts.as_of_revision < revision {
            return None;
        }
        counts.revisions.get(&revision).copied()
    }

    /// Most recent binary-status observation, if the path is known at all.
    pub fn is_binary(&self, path: &str) -> Option<bool> {
        self.paths.get(path).map(|c| c.binary)
    }

    /// Insert or update one entry. `as_of_revision` only ever moves forward.
    pub fn record(&mut self, path: &str, revision: u64, added: u64, removed: u64, binary: bool) {
        let counts = self.paths.entry(path.to_string()).or_default();
        counts.revisions.insert(
            revision,
            LineDelta {
                added,
                removed,
                binary,
            },
        );
        counts.as_of_revision = counts.as_of_revision.max(revision);
        if binary {
            counts.binary = true;
        }
    }

    /// Reconcile with a fresh observation from the live working copy. The
    /// observation extends the authoritative range for the path even when
    /// no new counts were computed.
    pub fn update_binary_status(&mut self, path: &str, binary: bool, current_revision: u64) {
        let counts = self.paths.entry(path.to_string()).or_default();
        counts.binary = binary;
        counts.as_of_revision = counts.as_of_revision.max(current_revision);
    }

    /// Number of (path, revision) entries.
    pub fn len(&self) -> usize {
        self.paths.values().map(|c| c.revisions.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Load a cache document, returning a fresh cache when the file is
    /// missing, unreadable or from another format version. A stale cache is
    /// only ever a performance loss, never an error.
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => {
                debug!("No cache document at {}, starting fresh", path.display());
                return Self::new();
            }
        };

        match serde_json::from_str::<LineCountCache>(&content) {
            Ok(cache) if cache.version == CACHE_FORMAT_VERSION => {
                debug!(
                    "Loaded {} cached line counts from {}",
                    cache.len(),
                    path.display()
                );
                cache
            }
            Ok(cache) => {
                warn!(
                    "Discarding cache document {} (format v{}, expected v{})",
                    path.display(),
                    cache.version,
                    CACHE_FORMAT_VERSION
                );
                Self::new()
            }
            Err(e) => {
                warn!("Discarding unreadable cache document {}: {}", path.display(), e);
                Self::new()
            }
        }
    }

    /// Serialize the whole document. Written to a sibling temp file first
    /// and renamed into place, so an interrupted snapshot never leaves a
    /// torn document behind.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create cache dir {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize cache")?;
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)
                .with_context(|| format!("Failed to create {}", tmp.display()))?;
            file.write_all(json.as_bytes())
                .with_context(|| format!("Failed to write {}", tmp.display()))?;
        }
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to move cache into place at {}", path.display()))?;
        Ok(())
    }
}
