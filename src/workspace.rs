//! Live working-copy observations
//!
//! Reconstruction needs a handful of facts the log cannot provide: whether a
//! path still exists, whether it is a directory, its current line count, and
//! a stable identity for the repository so cache documents from different
//! checkouts do not collide. [`WorkingCopy`] is the seam; [`FsWorkingCopy`]
//! answers from a checkout on disk, and tests substitute an in-memory map.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Fresh observations from a checked-out repository.
pub trait WorkingCopy: Send + Sync {
    /// Does the logged path currently exist in the checkout?
    fn exists(&self, path: &str) -> bool;

    /// Is the logged path a directory (not a file)?
    fn is_directory(&self, path: &str) -> bool;

    /// Line count of the live file, `None` if dead or unreadable.
    fn line_count(&self, path: &str) -> Option<u64>;

    /// Live binary-content observation, `None` if the path is dead.
    fn is_binary(&self, path: &str) -> Option<bool>;

    /// Stable identity for this repository, used to address cache documents.
    fn repository_id(&self) -> String;
}

/// [`WorkingCopy`] backed by a checkout on the local filesystem.
pub struct FsWorkingCopy {
    root: PathBuf,
}

impl FsWorkingCopy {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Logged paths are repository-absolute (`/trunk/src/a.rs`); map them
    /// onto the checkout root.
    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl WorkingCopy for FsWorkingCopy {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn is_directory(&self, path: &str) -> bool {
        self.resolve(path).is_dir()
    }

    fn line_count(&self, path: &str) -> Option<u64> {
        let full = self.resolve(path);
        if !full.is_file() {
            return None;
        }
        let bytes = fs::read(&full).ok()?;
        if looks_binary(&bytes) {
            return None;
        }
        Some(count_lines(&bytes))
    }

    fn is_binary(&self, path: &str) -> Option<bool> {
        let full = self.resolve(path);
        if !full.is_file() {
            return None;
        }
        fs::read(&full).ok().map(|bytes| looks_binary(&bytes))
    }

    fn repository_id(&self) -> String {
        repository_id_for(&self.root)
    }
}

/// Hash a checkout root into a unique but deterministic repository identity.
/// Uses the canonical path so `.` and the absolute path agree.
pub fn repository_id_for(root: &Path) -> String {
    let canonical = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
    let short: String = digest
        .iter()
        .take(6)
        .map(|b| format!("{:02x}", b))
        .collect();

    let name = canonical
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("repo")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .take(20)
        .collect::<String>();

    format!("{}-{}", name, short)
}

/// NUL-byte sniff in the first 8 KiB, the same heuristic diff tools use.
fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(8192).any(|&b| b == 0)
}

/// Count lines the way a diff counts them: a trailing newline does not open
/// an extra empty line.
fn count_lines(bytes: &[u8]) -> u64 {
    if bytes.is_empty() {
        return 0;
    }
    let newlines = bytes.iter().filter(|&&b| b == b'\n').count() as u64;
    if bytes.ends_with(b"\n") {
        newlines
    } else {
        newlines + 1
    }
}
