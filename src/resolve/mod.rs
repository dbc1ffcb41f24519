//! Line-count resolution against the external diff tool
//!
//! After assembly and inference every record knows its action but most know
//! nothing about line counts. The resolver fills them in: cache first, then
//! one external diff call per remaining (path, revision) pair, scheduled
//! through [`scheduler::AdaptiveScheduler`] so a checkout with thousands of
//! pending diffs uses the worker pool while a warm cache never pays the
//! thread startup cost.

pub mod scheduler;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{unbounded, RecvTimeoutError};
use dashmap::DashMap;
use indicatif::ProgressBar;
use tracing::{debug, info, warn};

use crate::cache::LineCountCache;
use crate::config::ResolveConfig;
use crate::diff::{count_diff_lines, DiffClient};
use crate::history::FileHistory;
use crate::workspace::WorkingCopy;
use scheduler::AdaptiveScheduler;

#[derive(Debug, Default, Clone, Copy)]
pub struct ResolutionStats {
    /// Pairs that needed counts at the start of the run.
    pub units: usize,
    pub cache_hits: usize,
    pub diff_calls: usize,
    pub binary_detected: usize,
    pub failed: usize,
    pub switched_to_pool: bool,
}

/// One (path, revision) pair awaiting counts, with the revision the diff
/// runs against.
#[derive(Debug, Clone)]
struct Unit {
    path: String,
    revision: u64,
    baseline: u64,
}

enum Outcome {
    Counts {
        path: String,
        revision: u64,
        added: u64,
        removed: u64,
    },
    Binary {
        path: String,
        revision: u64,
    },
    Failed,
    Suppressed,
}

pub struct DiffResolver {
    client: Arc<dyn DiffClient>,
    cache: Arc<Mutex<LineCountCache>>,
    document: PathBuf,
    config: ResolveConfig,
}

impl DiffResolver {
    pub fn new(
        client: Arc<dyn DiffClient>,
        cache: LineCountCache,
        document: PathBuf,
        config: ResolveConfig,
    ) -> Self {
        Self {
            client,
            cache: Arc::new(Mutex::new(cache)),
            document,
            config,
        }
    }

    /// Resolve every unresolved record in `histories`, consulting the live
    /// working copy for binary status and `latest_revision` as the cache
    /// authority horizon. The cache document is saved on completion and
    /// periodically along the way.
    pub fn run(
        &self,
        histories: &mut BTreeMap<String, FileHistory>,
        working_copy: &dyn WorkingCopy,
        latest_revision: u64,
        progress: Option<ProgressBar>,
    ) -> Result<ResolutionStats> {
        self.reconcile_binary_status(histories, working_copy, latest_revision);

        let units = collect_units(histories);
        let mut stats = ResolutionStats {
            units: units.len(),
            ..Default::default()
        };
        if let Some(pb) = &progress {
            pb.set_length(units.len() as u64);
        }
        debug!(units = units.len(), "collected resolution units");

        let deadline = Duration::from_secs(self.config.pool_deadline_hours * 3600);
        let mut sched = AdaptiveScheduler::new(
            self.config.workers,
            self.config.channel_capacity,
            Duration::from_millis(self.config.parallel_threshold_ms),
            deadline,
        );
        let (out_tx, out_rx) = unbounded();
        let binary_from: Arc<DashMap<String, u64>> = Arc::new(DashMap::new());
        let last_snapshot = Arc::new(Mutex::new(Instant::now()));
        let interval = Duration::from_secs(self.config.snapshot_interval_secs);

        let mut submitted = 0usize;
        for unit in units {
            let hit = lock(&self.cache).lookup(&unit.path, unit.revision);
            if let Some(delta) = hit {
                apply_counts(histories, &unit.path, unit.revision, delta.added, delta.removed);
                stats.cache_hits += 1;
                if let Some(pb) = &progress {
                    pb.inc(1);
                }
                continue;
            }

            let client = Arc::clone(&self.client);
            let cache = Arc::clone(&self.cache);
            let binary_from = Arc::clone(&binary_from);
            let last_snapshot = Arc::clone(&last_snapshot);
            let document = self.document.clone();
            let out_tx = out_tx.clone();
            let pb = progress.clone();
            sched.submit(move || {
                let outcome =
                    resolve_unit(&*client, &unit, latest_revision, &cache, &binary_from);
                maybe_snapshot(&cache, &last_snapshot, interval, &document);
                if let Some(pb) = &pb {
                    pb.inc(1);
                }
                let _ = out_tx.send(outcome);
            });
            submitted += 1;
        }
        drop(out_tx);

        // Workers the join abandons at the deadline still hold clones of the
        // outcome sender, so draining the channel until it disconnects could
        // wait on them anyway. Receive exactly one outcome per submitted unit
        // instead, against the same cutoff.
        let cutoff = Instant::now() + deadline;
        let sched_stats = sched.finish();
        stats.switched_to_pool = sched_stats.switched;

        let mut received = 0usize;
        while received < submitted {
            let remaining = cutoff.saturating_duration_since(Instant::now());
            let outcome = match out_rx.recv_timeout(remaining) {
                Ok(outcome) => outcome,
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        pending = submitted - received,
                        "deadline reached collecting resolution outcomes"
                    );
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            };
            received += 1;
            match outcome {
                Outcome::Counts {
                    path,
                    revision,
                    added,
                    removed,
                } => {
                    stats.diff_calls += 1;
                    apply_counts(histories, &path, revision, added, removed);
                }
                Outcome::Binary { path, revision } => {
                    stats.diff_calls += 1;
                    stats.binary_detected += 1;
                    if let Some(history) = histories.get_mut(&path) {
                        history.mark_binary_from(revision);
                    }
                }
                Outcome::Failed => {
                    stats.diff_calls += 1;
                    stats.failed += 1;
                }
                Outcome::Suppressed => {}
            }
        }

        lock(&self.cache).save(&self.document)?;
        info!(
            units = stats.units,
            cache_hits = stats.cache_hits,
            diff_calls = stats.diff_calls,
            binary = stats.binary_detected,
            failed = stats.failed,
            "line-count resolution finished"
        );
        Ok(stats)
    }

    /// Refresh cached binary flags from the live working copy and propagate
    /// known-binary status onto the histories before any diff is attempted.
    fn reconcile_binary_status(
        &self,
        histories: &mut BTreeMap<String, FileHistory>,
        working_copy: &dyn WorkingCopy,
        latest_revision: u64,
    ) {
        let mut cache = lock(&self.cache);
        for (path, history) in histories.iter_mut() {
            match working_copy.is_binary(path) {
                Some(flag) => {
                    cache.update_binary_status(path, flag, latest_revision);
                    if flag {
                        history.set_binary(true);
                    }
                }
                // File is gone from the checkout; trust the last observation.
                None => {
                    if cache.is_binary(path) == Some(true) {
                        history.set_binary(true);
                    }
                }
            }
        }
    }
}

/// Walk each history oldest-first and emit one unit per record that still
/// needs counts. Deletions are always zero and never diffed. The baseline is
/// the file's previous revision; the oldest record falls back to the
/// revision number just below its own. A record restored right after a
/// deletion gets the same fallback, since the dead revision has no content
/// to diff against.
fn collect_units(histories: &BTreeMap<String, FileHistory>) -> Vec<Unit> {
    let mut units = Vec::new();
    for (path, history) in histories {
        if history.is_binary() {
            continue;
        }
        let chron: Vec<_> = history.chronological().collect();
        for (i, rec) in chron.iter().enumerate() {
            if rec.is_deletion() || rec.is_resolved() {
                continue;
            }
            let baseline = match i.checked_sub(1).map(|j| chron[j]) {
                Some(prev) if !prev.is_deletion() => prev.revision,
                _ => match rec.revision.checked_sub(1) {
                    Some(base) => base,
                    None => continue,
                },
            };
            units.push(Unit {
                path: path.clone(),
                revision: rec.revision,
                baseline,
            });
        }
    }
    units
}

fn resolve_unit(
    client: &dyn DiffClient,
    unit: &Unit,
    latest_revision: u64,
    cache: &Mutex<LineCountCache>,
    binary_from: &DashMap<String, u64>,
) -> Outcome {
    // A sibling unit may have already proven the path binary.
    if binary_from
        .get(&unit.path)
        .map_or(false, |from| *from <= unit.revision)
    {
        return Outcome::Suppressed;
    }

    match client.diff(&unit.path, unit.baseline, unit.revision) {
        Ok(text) => {
            let (added, removed) = count_diff_lines(&text);
            lock(cache).record(&unit.path, unit.revision, added, removed, false);
            Outcome::Counts {
                path: unit.path.clone(),
                revision: unit.revision,
                added,
                removed,
            }
        }
        Err(err) if err.is_binary_content() => {
            debug!(path = %unit.path, revision = unit.revision, "binary content reported by diff");
            binary_from
                .entry(unit.path.clone())
                .and_modify(|from| *from = (*from).min(unit.revision))
                .or_insert(unit.revision);
            lock(cache).update_binary_status(&unit.path, true, latest_revision);
            Outcome::Binary {
                path: unit.path.clone(),
                revision: unit.revision,
            }
        }
        Err(err) => {
            warn!(
                path = %unit.path,
                baseline = unit.baseline,
                revision = unit.revision,
                error = %err,
                "diff failed, leaving counts unresolved"
            );
            Outcome::Failed
        }
    }
}

fn apply_counts(
    histories: &mut BTreeMap<String, FileHistory>,
    path: &str,
    revision: u64,
    added: u64,
    removed: u64,
) {
    if let Some(history) = histories.get_mut(path) {
        if let Some(rec) = history
            .records_mut()
            .iter_mut()
            .find(|r| r.revision == revision && !r.is_deletion())
        {
            rec.set_counts(added, removed);
        }
    }
}

/// Write the cache document when the interval has elapsed; a dying process
/// then loses at most one interval of resolved work.
fn maybe_snapshot(
    cache: &Mutex<LineCountCache>,
    last: &Mutex<Instant>,
    interval: Duration,
    document: &Path,
) {
    let due = {
        let mut last = last.lock().unwrap_or_else(|p| p.into_inner());
        if last.elapsed() >= interval {
            *last = Instant::now();
            true
        } else {
            false
        }
    };
    if due {
        let cache = lock(cache);
        match cache.save(document) {
            Ok(()) => debug!(entries = cache.len(), "cache snapshot written"),
            Err(err) => warn!(error = %err, "cache snapshot failed"),
        }
    }
}

fn lock(cache: &Mutex<LineCountCache>) -> MutexGuard<'_, LineCountCache> {
    cache.lock().unwrap_or_else(|p| p.into_inner())
}
