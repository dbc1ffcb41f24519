//! Implicit action inference
//!
//! The raw log records directory-level copy and delete operations only at
//! the directory path. Every descendant file they implicitly touched has to
//! be reconstructed here: insert the missing create/delete events, then
//! clean up the two ways the insertion over-shoots (double deletions and
//! implicit prefixes a later-retracted copy could not have produced).
//!
//! The passes run over the completed map in path-prefix order, so every
//! directory is visited immediately before its descendants.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::history::FileHistory;
use crate::models::RevisionRecord;
use crate::workspace::WorkingCopy;

/// Summary of one inference run.
#[derive(Debug, Clone, Default)]
pub struct InferenceStats {
    /// Implicit records inserted by the directory walk.
    pub inserted: usize,
    /// Deletions dropped because another deletion directly preceded them.
    pub double_deletions_removed: usize,
    /// Records trimmed by the over-insertion correction.
    pub over_insertions_removed: usize,
    /// Directory paths removed from the map after the walk.
    pub directories_removed: usize,
}

/// Compare repository paths so that every directory immediately precedes
/// its descendants: component-wise, a prefix sorts first. Plain string
/// order would wedge `/lib-old` between `/lib` and `/lib/a.txt`.
pub fn path_prefix_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.split('/').filter(|c| !c.is_empty());
    let mut right = b.split('/').filter(|c| !c.is_empty());
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match x.cmp(y) {
                Ordering::Equal => continue,
                other => return other,
            },
        }
    }
}

fn is_descendant(parent: &str, child: &str) -> bool {
    let parent = parent.trim_end_matches('/');
    child.len() > parent.len() + 1 && child.starts_with(parent) && child.as_bytes()[parent.len()] == b'/'
}

/// Post-processes the completed map of histories, recovering file-level
/// events implied by ancestor-directory operations.
pub struct ImplicitActionInferencer<'a> {
    working_copy: &'a dyn WorkingCopy,
}

impl<'a> ImplicitActionInferencer<'a> {
    pub fn new(working_copy: &'a dyn WorkingCopy) -> Self {
        Self { working_copy }
    }

    /// Run all passes. Safe to call on an already-inferred map: the
    /// insertion pass finds every implied event already present and adds
    /// nothing new.
    pub fn run(&self, histories: &mut BTreeMap<String, FileHistory>) -> InferenceStats {
        let mut stats = InferenceStats::default();
        stats.inserted = self.insert_implied_events(histories);
        stats.double_deletions_removed = remove_double_deletions(histories);
        stats.over_insertions_removed = self.correct_over_insertions(histories);
        stats.directories_removed = self.remove_directories(histories);
        info!(
            "Inference: {} implicit events inserted, {} double deletions removed, \
             {} over-insertions trimmed, {} directories dropped",
            stats.inserted,
            stats.double_deletions_removed,
            stats.over_insertions_removed,
            stats.directories_removed
        );
        stats
    }

    /// A path is treated as a directory when the working copy says so, or
    /// when the map holds descendants for it (the checkout cannot testify
    /// about directories that no longer exist).
    fn is_directory(
        &self,
        path: &str,
        ordered: &[String],
        index: usize,
    ) -> bool {
        if self.working_copy.is_directory(path) {
            return true;
        }
        ordered
            .get(index + 1)
            .map(|next| is_descendant(path, next))
            .unwrap_or(false)
    }

    /// Pass 1: revision-ordered insertion of cloned directory events into
    /// descendants.
    ///
    /// A directory deletion applies to descendants that already existed
    /// before it. A directory creation (a copy with history) applies to
    /// descendants whose first logged revision comes later and is not
    /// itself a creation: a file that enters the log mid-life, being
    /// modified or deleted, can only have arrived with the copy. A
    /// descendant that already has an event at exactly that revision is
    /// left alone.
    fn insert_implied_events(&self, histories: &mut BTreeMap<String, FileHistory>) -> usize {
        let mut ordered: Vec<String> = histories.keys().cloned().collect();
        ordered.sort_by(|a, b| path_prefix_cmp(a, b));

        // Directory records are collected first; the map is mutated below.
        let mut directory_ops: Vec<(String, Vec<RevisionRecord>)> = Vec::new();
        for (i, path) in ordered.iter().enumerate() {
            if !self.is_directory(path, &ordered, i) {
                continue;
            }
            let ops: Vec<RevisionRecord> = histories[path]
                .records()
                .iter()
                .filter(|r| r.is_creation_or_restore() || r.is_deletion())
                .cloned()
                .collect();
            if !ops.is_empty() {
                directory_ops.push((path.clone(), ops));
            }
        }

        let mut inserted = 0;
        for (dir, ops) in &directory_ops {
            for child in ordered.iter().filter(|c| is_descendant(dir, c)) {
                let history = histories.get_mut(child).expect("ordered key vanished");
                let (earliest, earliest_is_creation) = match history.records().last() {
                    Some(rec) => (rec.revision, rec.is_creation_or_restore()),
                    None => continue,
                };
                for op in ops {
                    if history.has_revision(op.revision) {
                        continue;
                    }
                    let applies = if op.is_deletion() {
                        earliest < op.revision
                    } else {
                        earliest > op.revision && !earliest_is_creation
                    };
                    if applies {
                        debug!(
                            "Inferred {} at r{} for {} from directory {}",
                            op.action, op.revision, child, dir
                        );
                        history.insert_by_revision(op.as_implicit());
                        inserted += 1;
                    }
                }
            }
        }
        inserted
    }

    /// Pass 3: over-insertion correction for paths missing from the working
    /// copy whose history does not end in a deletion. The leading run of
    /// implicit records is history a prior but later-retracted copy could
    /// not have produced, so it is removed -- except when an implicit
    /// creation is directly followed by an explicitly logged change, which
    /// is evidence the file really was there.
    ///
    /// Heuristic, not a verified reconstruction: the log alone cannot
    /// distinguish "absent before the ancestor copy" from "present but
    /// untouched since before the observed window".
    fn correct_over_insertions(&self, histories: &mut BTreeMap<String, FileHistory>) -> usize {
        let mut removed = 0;
        for (path, history) in histories.iter_mut() {
            if self.working_copy.exists(path) {
                continue;
            }
            match history.newest() {
                Some(rec) if !rec.is_deletion() => {}
                _ => continue,
            }

            loop {
                let records = history.records();
                let n = records.len();
                if n == 0 {
                    break;
                }
                let earliest = &records[n - 1];
                if !earliest.implicit {
                    break;
                }
                let followed_by_real_change = n >= 2
                    && earliest.is_creation_or_restore()
                    && records[n - 2].is_change()
                    && !records[n - 2].implicit;
                if followed_by_real_change {
                    break;
                }
                debug!(
                    "Retracting implicit {} at r{} for vanished {}",
                    earliest.action, earliest.revision, path
                );
                history.remove_earliest();
                removed += 1;
            }
        }
        removed
    }

    /// Final step: directories are not files; statistics consumers only
    /// want file histories.
    fn remove_directories(&self, histories: &mut BTreeMap<String, FileHistory>) -> usize {
        let mut ordered: Vec<String> = histories.keys().cloned().collect();
        ordered.sort_by(|a, b| path_prefix_cmp(a, b));

        let directories: Vec<String> = ordered
            .iter()
            .enumerate()
            .filter(|(i, path)| self.is_directory(path, &ordered, *i))
            .map(|(_, path)| path.clone())
            .collect();

        for dir in &directories {
            histories.remove(dir);
        }
        directories.len()
    }
}

/// Pass 2: drop any deletion immediately preceded chronologically by another
/// deletion. Both a file and an ancestor directory deletion can be inferred
/// for the same logical removal.
fn remove_double_deletions(histories: &mut BTreeMap<String, FileHistory>) -> usize {
    let mut removed = 0;
    for history in histories.values_mut() {
        loop {
            // Storage is newest-first: records[i] chronologically follows
            // records[i + 1]. The later of two adjacent deletions goes.
            let duplicate = history
                .records()
                .windows(2)
                .position(|pair| pair[0].is_deletion() && pair[1].is_deletion());
            match duplicate {
                Some(i) => {
                    let rec = history.records()[i].clone();
                    debug!(
                        "Dropping duplicate deletion at r{} for {}",
                        rec.revision,
                        history.path()
                    );
                    remove_at(history, i);
                    removed += 1;
                }
                None => break,
            }
        }
    }
    removed
}

fn remove_at(history: &mut FileHistory, index: usize) {
    // FileHistory does not expose positional removal; rebuild without the
    // offending record. Histories are short, this is not a hot path.
    let records: Vec<RevisionRecord> = history
        .records()
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, r)| r.clone())
        .collect();
    let mut rebuilt = FileHistory::new(history.path().to_string(), history.is_binary());
    for rec in records {
        rebuilt.insert_by_revision(rec);
    }
    *history = rebuilt;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileAction, RevisionRecord};
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;

    /// In-memory working copy for inference tests.
    struct FakeWorkingCopy {
        files: HashMap<String, u64>,
        directories: Vec<String>,
    }

    impl FakeWorkingCopy {
        fn empty() -> Self {
            Self {
                files: HashMap::new(),
                directories: Vec::new(),
            }
        }

        fn with_file(mut self, path: &str, lines: u64) -> Self {
            self.files.insert(path.to_string(), lines);
            self
        }

        fn with_directory(mut self, path: &str) -> Self {
            self.directories.push(path.to_string());
            self
        }
    }

    impl WorkingCopy for FakeWorkingCopy {
        fn exists(&self, path: &str) -> bool {
            self.files.contains_key(path) || self.directories.iter().any(|d| d == path)
        }

        fn is_directory(&self, path: &str) -> bool {
            self.directories.iter().any(|d| d == path)
        }

        fn line_count(&self, path: &str) -> Option<u64> {
            self.files.get(path).copied()
        }

        fn is_binary(&self, _path: &str) -> Option<bool> {
            None
        }

        fn repository_id(&self) -> String {
            "fake-000000000000".into()
        }
    }

    fn rec(revision: u64, action: FileAction) -> RevisionRecord {
        RevisionRecord {
            revision,
            author: "alice".into(),
            timestamp: Utc
                .with_ymd_and_hms(2024, 3, 1, 0, 0, 0)
                .unwrap()
                + chrono::Duration::hours(revision as i64),
            comment: String::new(),
            action,
            lines_added: None,
            lines_removed: None,
            implicit: false,
        }
    }

    fn history(path: &str, mut revisions: Vec<RevisionRecord>) -> FileHistory {
        // Build in log order: newest first.
        revisions.sort_by(|a, b| b.revision.cmp(&a.revision));
        let mut fh = FileHistory::new(path, false);
        for r in revisions {
            fh.record(r);
        }
        fh
    }

    #[test]
    fn prefix_order_puts_directories_before_descendants() {
        let mut paths = vec!["/lib-old", "/lib/a.txt", "/lib", "/lib/z/deep.txt"];
        paths.sort_by(|a, b| path_prefix_cmp(a, b));
        assert_eq!(paths, vec!["/lib", "/lib/a.txt", "/lib/z/deep.txt", "/lib-old"]);
    }

    #[test]
    fn directory_deletion_reaches_descendants() {
        // /lib added r5, /lib/a.txt added r9, /lib deleted r12 at the
        // directory level only.
        let mut map = BTreeMap::new();
        map.insert(
            "/lib".to_string(),
            history("/lib", vec![rec(5, FileAction::Added), rec(12, FileAction::Deleted)]),
        );
        map.insert(
            "/lib/a.txt".to_string(),
            history("/lib/a.txt", vec![rec(9, FileAction::Added)]),
        );

        let wc = FakeWorkingCopy::empty();
        let stats = ImplicitActionInferencer::new(&wc).run(&mut map);

        assert!(stats.inserted >= 1);
        assert!(!map.contains_key("/lib"), "directory must be removed");
        let a = &map["/lib/a.txt"];
        let del = a
            .records()
            .iter()
            .find(|r| r.revision == 12)
            .expect("synthetic deletion at r12");
        assert!(del.is_deletion());
        assert!(del.implicit);
    }

    #[test]
    fn directory_copy_reaches_later_descendants() {
        // /branch created at r20 as a copy; /branch/a.txt first logged at
        // r25. The file must have arrived with the copy.
        let mut map = BTreeMap::new();
        map.insert(
            "/branch".to_string(),
            history("/branch", vec![rec(20, FileAction::Added)]),
        );
        map.insert(
            "/branch/a.txt".to_string(),
            history("/branch/a.txt", vec![rec(25, FileAction::Modified)]),
        );

        let wc = FakeWorkingCopy::empty().with_file("/branch/a.txt", 10);
        ImplicitActionInferencer::new(&wc).run(&mut map);

        let a = &map["/branch/a.txt"];
        let created = a.records().iter().find(|r| r.revision == 20).unwrap();
        assert!(created.is_creation_or_restore());
        assert!(created.implicit);
    }

    #[test]
    fn existing_event_at_same_revision_blocks_insertion() {
        let mut map = BTreeMap::new();
        map.insert(
            "/lib".to_string(),
            history("/lib", vec![rec(5, FileAction::Added), rec(12, FileAction::Deleted)]),
        );
        // The file's own deletion was logged explicitly at r12.
        map.insert(
            "/lib/a.txt".to_string(),
            history(
                "/lib/a.txt",
                vec![rec(9, FileAction::Added), rec(12, FileAction::Deleted)],
            ),
        );

        let wc = FakeWorkingCopy::empty();
        ImplicitActionInferencer::new(&wc).run(&mut map);

        let a = &map["/lib/a.txt"];
        let at_12: Vec<_> = a.records().iter().filter(|r| r.revision == 12).collect();
        assert_eq!(at_12.len(), 1);
        assert!(!at_12[0].implicit);
        // The plain directory creation at r5 implies nothing for a file
        // whose own first record is already a creation.
        assert!(!a.has_revision(5));
    }

    #[test]
    fn inference_is_idempotent() {
        let mut map = BTreeMap::new();
        map.insert(
            "/lib".to_string(),
            history("/lib", vec![rec(5, FileAction::Added), rec(12, FileAction::Deleted)]),
        );
        map.insert(
            "/lib/a.txt".to_string(),
            history("/lib/a.txt", vec![rec(9, FileAction::Added)]),
        );

        let wc = FakeWorkingCopy::empty();
        let inferencer = ImplicitActionInferencer::new(&wc);
        inferencer.run(&mut map);
        let snapshot: Vec<(String, Vec<u64>)> = map
            .iter()
            .map(|(p, h)| (p.clone(), h.records().iter().map(|r| r.revision).collect()))
            .collect();

        let stats = inferencer.run(&mut map);
        assert_eq!(stats.inserted, 0);
        let after: Vec<(String, Vec<u64>)> = map
            .iter()
            .map(|(p, h)| (p.clone(), h.records().iter().map(|r| r.revision).collect()))
            .collect();
        assert_eq!(snapshot, after);
    }

    #[test]
    fn double_deletions_collapse_to_the_first() {
        let mut map = BTreeMap::new();
        map.insert(
            "/a.txt".to_string(),
            history(
                "/a.txt",
                vec![
                    rec(5, FileAction::Added),
                    rec(10, FileAction::Deleted),
                    rec(12, FileAction::Deleted),
                ],
            ),
        );

        let removed = remove_double_deletions(&mut map);
        assert_eq!(removed, 1);
        let revs: Vec<u64> = map["/a.txt"].records().iter().map(|r| r.revision).collect();
        assert_eq!(revs, vec![10, 5]);
    }

    #[test]
    fn trims_implicit_prefix_of_vanished_file() {
        // The file is gone from the working copy but its history does not
        // end in a deletion: the leading implicit events were inserted for
        // a copy that was later retracted. Approximation by design, the log
        // alone cannot prove what the copy contained.
        let mut implicit_add = rec(20, FileAction::Added);
        implicit_add.implicit = true;
        let mut implicit_mod = rec(22, FileAction::Modified);
        implicit_mod.implicit = true;

        let mut map = BTreeMap::new();
        map.insert(
            "/retracted.txt".to_string(),
            history("/retracted.txt", vec![implicit_add, implicit_mod]),
        );

        let wc = FakeWorkingCopy::empty();
        let stats = ImplicitActionInferencer::new(&wc).run(&mut map);
        assert_eq!(stats.over_insertions_removed, 2);
        assert!(map["/retracted.txt"].is_empty());
    }

    #[test]
    fn implicit_creation_with_real_change_is_kept() {
        let mut implicit_add = rec(20, FileAction::Added);
        implicit_add.implicit = true;
        let explicit_mod = rec(22, FileAction::Modified);

        let mut map = BTreeMap::new();
        map.insert(
            "/kept.txt".to_string(),
            history("/kept.txt", vec![implicit_add, explicit_mod]),
        );

        let wc = FakeWorkingCopy::empty();
        let stats = ImplicitActionInferencer::new(&wc).run(&mut map);
        assert_eq!(stats.over_insertions_removed, 0);
        assert_eq!(map["/kept.txt"].records().len(), 2);
    }

    #[test]
    fn live_directories_are_removed_from_the_map() {
        let mut map = BTreeMap::new();
        map.insert(
            "/src".to_string(),
            history("/src", vec![rec(5, FileAction::Added)]),
        );
        map.insert(
            "/src/a.rs".to_string(),
            history("/src/a.rs", vec![rec(5, FileAction::Added)]),
        );

        let wc = FakeWorkingCopy::empty()
            .with_directory("/src")
            .with_file("/src/a.rs", 3);
        ImplicitActionInferencer::new(&wc).run(&mut map);

        assert!(!map.contains_key("/src"));
        assert!(map.contains_key("/src/a.rs"));
    }
}
