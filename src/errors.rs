//! Error taxonomy
//!
//! Two tiers. Structural problems in the activity log are fatal: a stream
//! that violates revision ordering or cannot be decoded produces no usable
//! history. Diff failures are per-unit: the affected revision stays
//! unresolved and the run continues.

use std::io;

use thiserror::Error;

/// Fatal defects in the activity-log stream itself.
#[derive(Debug, Error)]
pub enum StructuralLogError {
    /// The stream must be strictly newest-first.
    #[error("log out of order: r{seen} after r{previous}")]
    OutOfOrder { previous: u64, seen: u64 },

    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    /// The underlying reader failed mid-stream.
    #[error("log stream truncated: {0}")]
    Truncated(String),
}

/// Failures of a single external diff call.
#[derive(Debug, Error)]
pub enum DiffError {
    /// The tool refused to diff binary content. Not a defect: the caller
    /// reclassifies the path and stops asking.
    #[error("{path} holds binary content at r{revision}")]
    BinaryContent { path: String, revision: u64 },

    #[error("diff of {path} r{old_revision}:r{new_revision} failed: {message}")]
    Tool {
        path: String,
        old_revision: u64,
        new_revision: u64,
        message: String,
    },

    #[error("diff I/O failure: {0}")]
    Io(#[from] io::Error),
}

impl DiffError {
    pub fn is_binary_content(&self) -> bool {
        matches!(self, DiffError::BinaryContent { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_content_is_distinguishable() {
        let err = DiffError::BinaryContent {
            path: "/logo.png".into(),
            revision: 10,
        };
        assert!(err.is_binary_content());

        let err = DiffError::Tool {
            path: "/x.txt".into(),
            old_revision: 1,
            new_revision: 2,
            message: "connection refused".into(),
        };
        assert!(!err.is_binary_content());
    }

    #[test]
    fn messages_name_the_revisions() {
        let err = StructuralLogError::OutOfOrder {
            previous: 7,
            seen: 9,
        };
        assert_eq!(err.to_string(), "log out of order: r9 after r7");
    }
}
