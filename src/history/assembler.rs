//! History assembly from the decoded log stream
//!
//! Owns the ordered map of path -> [`FileHistory`], creating entries on
//! first sighting, applying the configured path filters, and enforcing the
//! newest-first grammar of the log. Assembly is strictly single-threaded:
//! the last-seen revision forms a small validation automaton, and every
//! record for a path must be seen before that path can be finalized.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::PathFilter;
use crate::errors::StructuralLogError;
use crate::history::FileHistory;
use crate::models::RevisionRecord;
use crate::source::{LogSource, PathEvent};

/// Summary of one assembly run.
#[derive(Debug, Clone, Default)]
pub struct AssemblyStats {
    /// Path-level entries consumed from the log.
    pub events: usize,
    /// Distinct paths kept in the map.
    pub paths: usize,
    /// Entries dropped by the include/exclude filters.
    pub filtered: usize,
}

/// Accumulates the raw log into per-path histories.
pub struct HistoryAssembler {
    histories: BTreeMap<String, FileHistory>,
    filter: PathFilter,
    /// Newest-first enforcement: revision ids must never increase.
    last_revision: Option<u64>,
    /// Oldest timestamp seen; the log is newest-first, so this is the last.
    window_start: Option<DateTime<Utc>>,
    /// Highest revision id seen anywhere in the log.
    latest_revision: u64,
    stats: AssemblyStats,
}

impl HistoryAssembler {
    pub fn new(filter: PathFilter) -> Self {
        Self {
            histories: BTreeMap::new(),
            filter,
            last_revision: None,
            window_start: None,
            latest_revision: 0,
            stats: AssemblyStats::default(),
        }
    }

    /// Drain a log source, strictly in order. The first grammar violation
    /// aborts: a partially-trusted history is worse than none.
    pub fn consume<S: LogSource>(&mut self, source: S) -> Result<(), StructuralLogError> {
        for event in source {
            self.push(event?)?;
        }
        info!(
            "Assembled {} paths from {} log entries ({} filtered out)",
            self.histories.len(),
            self.stats.events,
            self.stats.filtered
        );
        Ok(())
    }

    /// Apply one decoded path-event.
    pub fn push(&mut self, event: PathEvent) -> Result<(), StructuralLogError> {
        if let Some(previous) = self.last_revision {
            if event.revision > previous {
                return Err(StructuralLogError::OutOfOrder {
                    previous,
                    seen: event.revision,
                });
            }
        }
        self.last_revision = Some(event.revision);
        self.latest_revision = self.latest_revision.max(event.revision);
        self.window_start = Some(match self.window_start {
            Some(start) => start.min(event.timestamp),
            None => event.timestamp,
        });
        self.stats.events += 1;

        if !self.filter.matches(&event.path) {
            self.stats.filtered += 1;
            return Ok(());
        }

        let history = self
            .histories
            .entry(event.path.clone())
            .or_insert_with(|| {
                debug!("First sighting of {}", event.path);
                FileHistory::new(event.path.clone(), event.binary_hint)
            });
        if event.binary_hint && !history.is_binary() {
            history.set_binary(true);
        }

        history.record(RevisionRecord {
            revision: event.revision,
            author: event.author,
            timestamp: event.timestamp,
            comment: event.comment,
            action: event.action,
            lines_added: None,
            lines_removed: None,
            implicit: false,
        });

        Ok(())
    }

    /// Start of the observed log window (oldest timestamp seen).
    pub fn window_start(&self) -> Option<DateTime<Utc>> {
        self.window_start
    }

    /// Highest revision id observed in the log.
    pub fn latest_revision(&self) -> u64 {
        self.latest_revision
    }

    pub fn stats(&self) -> AssemblyStats {
        AssemblyStats {
            paths: self.histories.len(),
            ..self.stats.clone()
        }
    }

    /// Hand the completed map to the next phase.
    pub fn into_histories(self) -> BTreeMap<String, FileHistory> {
        self.histories
    }

    pub fn histories(&self) -> &BTreeMap<String, FileHistory> {
        &self.histories
    }
}
