//! Per-path revision accumulation and finalization
//!
//! A [`FileHistory`] collects raw records in log order (newest first) while
//! the assembler drains the log, then [`FileHistory::finalize`] re-expresses
//! them once as a read-only chronological event sequence with running
//! line-of-code totals and a synthetic begin-of-log baseline.

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::models::{EventKind, FileEvent, RevisionRecord};

/// Mutable accumulation state for one logged path.
#[derive(Debug, Clone)]
pub struct FileHistory {
    path: String,
    binary: bool,
    /// Log order: newest revision first.
    records: Vec<RevisionRecord>,
}

impl FileHistory {
    pub fn new(path: impl Into<String>, binary_hint: bool) -> Self {
        Self {
            path: path.into(),
            binary: binary_hint,
            records: Vec::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    /// Flip the binary flag. Turning it on zeroes every non-creation delta
    /// already accumulated; line counts are meaningless for binary content.
    pub fn set_binary(&mut self, binary: bool) {
        self.binary = binary;
        if binary {
            for rec in &mut self.records {
                if !rec.is_creation_or_restore() {
                    rec.zero_counts();
                }
            }
        }
    }

    /// Mark the file binary from a diff-time observation and zero counts for
    /// that revision and everything newer. Older revisions keep whatever was
    /// already resolved for them.
    pub fn mark_binary_from(&mut self, revision: u64) {
        self.binary = true;
        for rec in &mut self.records {
            if rec.revision >= revision && !rec.is_creation_or_restore() {
                rec.zero_counts();
            }
        }
    }

    /// Append one record in log order (newest first).
    ///
    /// The consecutive-biography invariant is checked here: the previously
    /// appended (newer) record, when a plain modification, may only be
    /// preceded chronologically by a creation/restore or another
    /// modification. Violations are logged and kept; real logs exhibit them
    /// for binary and keyword-substitution edge cases, and a best-effort
    /// history beats an aborted run.
    pub fn record(&mut self, mut rec: RevisionRecord) {
        if rec.is_deletion() || (self.binary && !rec.is_creation_or_restore()) {
            rec.zero_counts();
        }

        if let Some(newer) = self.records.last() {
            if newer.revision <= rec.revision {
                warn!(
                    "{}: log-order violation, r{} recorded after r{}",
                    self.path, rec.revision, newer.revision
                );
            }
            if newer.is_change() && rec.is_deletion() {
                warn!(
                    "{}: modification at r{} chronologically follows deletion at r{}",
                    self.path, newer.revision, rec.revision
                );
            }
        }

        self.records.push(rec);
    }

    /// Records in log order (newest first).
    pub fn records(&self) -> &[RevisionRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [RevisionRecord] {
        &mut self.records
    }

    /// Records oldest first.
    pub fn chronological(&self) -> impl DoubleEndedIterator<Item = &RevisionRecord> {
        self.records.iter().rev()
    }

    pub fn earliest_revision(&self) -> Option<u64> {
        self.records.last().map(|r| r.revision)
    }

    pub fn latest_revision(&self) -> Option<u64> {
        self.records.first().map(|r| r.revision)
    }

    pub fn has_revision(&self, revision: u64) -> bool {
        self.records.iter().any(|r| r.revision == revision)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The chronologically last record, if any.
    pub fn newest(&self) -> Option<&RevisionRecord> {
        self.records.first()
    }

    /// Insert a record at its revision-ordered position (not an append).
    /// Storage is newest-first, so the record lands before the first entry
    /// with a smaller revision.
    pub fn insert_by_revision(&mut self, rec: RevisionRecord) {
        let pos = self
            .records
            .iter()
            .position(|r| r.revision < rec.revision)
            .unwrap_or(self.records.len());
        self.records.insert(pos, rec);
    }

    /// Drop the chronologically earliest record. Used by the over-insertion
    /// correction pass.
    pub fn remove_earliest(&mut self) -> Option<RevisionRecord> {
        self.records.pop()
    }

    /// Produce the read-only chronological event sequence.
    ///
    /// Must be called once, after diff resolution has filled line counts.
    /// The running LOC counter is seeded with the live working-copy count;
    /// for dead files it falls back to the maximum running total reached
    /// replaying deltas forward, a documented lower bound since deleted
    /// files cannot be recounted.
    ///
    /// Returns `None` for a path with zero records and no live line count:
    /// it never existed inside the observed window.
    pub fn finalize(
        &self,
        window_start: DateTime<Utc>,
        live_lines: Option<u64>,
    ) -> Option<Vec<FileEvent>> {
        if self.records.is_empty() && live_lines.is_none() {
            return None;
        }

        let current = if self.binary {
            0
        } else {
            live_lines.unwrap_or_else(|| self.approximate_final_loc())
        };

        // Walk newest -> oldest assigning the total in force after each
        // record. A deletion leaves the counter untouched (it held the count
        // in force just before the delete, which older records still need);
        // crossing a creation resets it, the file did not exist before.
        // Whatever is left over is the line count at the window start.
        let mut totals = vec![0u64; self.records.len()];
        let mut loc = current as i64;
        for (i, rec) in self.records.iter().enumerate() {
            if rec.is_deletion() {
                totals[i] = 0;
            } else if rec.is_creation_or_restore() || self.binary {
                totals[i] = loc.max(0) as u64;
                loc = 0;
            } else {
                totals[i] = loc.max(0) as u64;
                loc -= rec.delta();
            }
        }
        let baseline = loc.max(0) as u64;

        let mut events = Vec::with_capacity(self.records.len() + 1);
        events.push(FileEvent {
            kind: EventKind::BeginOfLog,
            revision: 0,
            author: String::new(),
            timestamp: window_start - Duration::minutes(1),
            comment: String::new(),
            lines_added: 0,
            lines_removed: 0,
            lines_total: baseline,
            implicit: false,
        });

        // Chronological emission with a small liveness automaton; impossible
        // states are logged and skipped, never fatal.
        let mut alive: Option<bool> = None;
        for (i, rec) in self.records.iter().enumerate().rev() {
            let kind = if rec.is_deletion() {
                if alive == Some(false) {
                    warn!(
                        "{}: skipping duplicate deletion at r{}",
                        self.path, rec.revision
                    );
                    continue;
                }
                alive = Some(false);
                EventKind::Deleted
            } else if rec.is_creation_or_restore() || self.binary {
                alive = Some(true);
                EventKind::Created
            } else {
                if alive == Some(false) {
                    warn!(
                        "{}: skipping modification of dead file at r{}",
                        self.path, rec.revision
                    );
                    continue;
                }
                alive = Some(true);
                EventKind::Changed
            };

            events.push(FileEvent {
                kind,
                revision: rec.revision,
                author: rec.author.clone(),
                timestamp: rec.timestamp,
                comment: rec.comment.clone(),
                lines_added: rec.lines_added.unwrap_or(0),
                lines_removed: rec.lines_removed.unwrap_or(0),
                lines_total: totals[i],
                implicit: rec.implicit,
            });
        }

        Some(events)
    }

    /// Approximate the line count a dead file held at its final revision:
    /// the maximum running total reached while replaying the deltas. A lower
    /// bound, since a deleted file cannot be recounted and unresolved
    /// revisions contribute zero.
    fn approximate_final_loc(&self) -> u64 {
        let mut running = 0i64;
        let mut max = 0i64;
        // Storage is newest-first; the replay goes oldest-first.
        for rec in self.records.iter().rev() {
            running += rec.lines_added.unwrap_or(0) as i64;
            max = max.max(running);
            running -= rec.lines_removed.unwrap_or(0) as i64;
        }
        max.max(0) as u64
    }
}
