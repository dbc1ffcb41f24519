//! Core data models for revchron
//!
//! These models are threaded through every phase: raw log records become
//! [`RevisionRecord`]s during assembly, and finalization re-expresses them
//! as read-only [`FileEvent`]s carrying running line-of-code totals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Action code recorded in the activity log for one path in one commit.
///
/// Serialized as the log's one-letter codes (`A`/`M`/`R`/`D`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileAction {
    #[serde(rename = "A")]
    Added,
    #[serde(rename = "M")]
    Modified,
    #[serde(rename = "R")]
    Replaced,
    #[serde(rename = "D")]
    Deleted,
}

impl FileAction {
    /// Added and Replaced both bring a path (back) into existence.
    pub fn is_creation_or_restore(&self) -> bool {
        matches!(self, FileAction::Added | FileAction::Replaced)
    }

    pub fn is_change(&self) -> bool {
        matches!(self, FileAction::Modified)
    }

    pub fn is_deletion(&self) -> bool {
        matches!(self, FileAction::Deleted)
    }
}

impl std::fmt::Display for FileAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileAction::Added => write!(f, "A"),
            FileAction::Modified => write!(f, "M"),
            FileAction::Replaced => write!(f, "R"),
            FileAction::Deleted => write!(f, "D"),
        }
    }
}

/// One committed change to one path.
///
/// Mutable until finalization: line counts start at the unknown sentinel
/// (`None`) and are filled in by diff resolution; implicit copies are cloned
/// into descendant paths by the inference pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionRecord {
    /// Opaque, totally ordered revision identifier.
    pub revision: u64,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub comment: String,
    pub action: FileAction,
    /// `None` until resolved by a diff call or cache hit.
    #[serde(default)]
    pub lines_added: Option<u64>,
    #[serde(default)]
    pub lines_removed: Option<u64>,
    /// Synthesized by implicit-action inference, never observed in the log.
    #[serde(default)]
    pub implicit: bool,
}

impl RevisionRecord {
    pub fn is_creation_or_restore(&self) -> bool {
        self.action.is_creation_or_restore()
    }

    pub fn is_change(&self) -> bool {
        self.action.is_change()
    }

    pub fn is_deletion(&self) -> bool {
        self.action.is_deletion()
    }

    /// True once both counts have left the unknown sentinel.
    pub fn is_resolved(&self) -> bool {
        self.lines_added.is_some() && self.lines_removed.is_some()
    }

    /// Net line delta, treating unresolved counts as zero.
    pub fn delta(&self) -> i64 {
        self.lines_added.unwrap_or(0) as i64 - self.lines_removed.unwrap_or(0) as i64
    }

    /// Overwrite both counts. Deletions never carry positive counts.
    pub fn set_counts(&mut self, added: u64, removed: u64) {
        if self.is_deletion() {
            self.lines_added = Some(0);
            self.lines_removed = Some(0);
        } else {
            self.lines_added = Some(added);
            self.lines_removed = Some(removed);
        }
    }

    /// Force counts to zero, used for deletions and binary revisions.
    pub fn zero_counts(&mut self) {
        self.lines_added = Some(0);
        self.lines_removed = Some(0);
    }

    /// Clone this record for propagation into a descendant path.
    pub fn as_implicit(&self) -> RevisionRecord {
        let mut copy = self.clone();
        copy.implicit = true;
        copy
    }
}

/// Kind of a finalized history event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Creation or restore of the path.
    Created,
    /// A plain modification.
    Changed,
    /// The path ceased to exist.
    Deleted,
    /// Synthetic event one minute before the observed log window, carrying
    /// the line count in force at that instant.
    BeginOfLog,
}

/// One finalized, read-only event in a file's chronological history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEvent {
    pub kind: EventKind,
    pub revision: u64,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub comment: String,
    pub lines_added: u64,
    pub lines_removed: u64,
    /// Running line-of-code total in force after this event.
    pub lines_total: u64,
    #[serde(default)]
    pub implicit: bool,
}

impl FileEvent {
    pub fn delta(&self) -> i64 {
        self.lines_added as i64 - self.lines_removed as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(revision: u64, action: FileAction) -> RevisionRecord {
        RevisionRecord {
            revision,
            author: "alice".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            comment: String::new(),
            action,
            lines_added: None,
            lines_removed: None,
            implicit: false,
        }
    }

    #[test]
    fn action_predicates() {
        assert!(FileAction::Added.is_creation_or_restore());
        assert!(FileAction::Replaced.is_creation_or_restore());
        assert!(FileAction::Modified.is_change());
        assert!(FileAction::Deleted.is_deletion());
        assert!(!FileAction::Modified.is_creation_or_restore());
    }

    #[test]
    fn action_serializes_as_log_codes() {
        let json = serde_json::to_string(&FileAction::Replaced).unwrap();
        assert_eq!(json, "\"R\"");
        let back: FileAction = serde_json::from_str("\"D\"").unwrap();
        assert_eq!(back, FileAction::Deleted);
    }

    #[test]
    fn unresolved_counts_are_the_sentinel() {
        let rec = record(10, FileAction::Modified);
        assert!(!rec.is_resolved());
        assert_eq!(rec.delta(), 0);
    }

    #[test]
    fn deletion_never_carries_positive_counts() {
        let mut rec = record(12, FileAction::Deleted);
        rec.set_counts(4, 1);
        assert_eq!(rec.lines_added, Some(0));
        assert_eq!(rec.lines_removed, Some(0));
    }

    #[test]
    fn implicit_copy_is_tagged() {
        let rec = record(5, FileAction::Added);
        let copy = rec.as_implicit();
        assert!(copy.implicit);
        assert!(!rec.implicit);
        assert_eq!(copy.revision, rec.revision);
    }
}
