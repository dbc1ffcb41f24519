//! End-to-end analysis pipeline
//!
//! Wires the phases together: assemble per-file histories from the activity
//! log, infer the implicit records directory operations imply, resolve line
//! counts through the cache and the external diff tool, then finalize each
//! history into its chronological event list.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use tracing::{debug, info};

use crate::cache::LineCountCache;
use crate::config::{PathFilter, ProjectConfig};
use crate::diff::DiffClient;
use crate::history::{
    AssemblyStats, HistoryAssembler, ImplicitActionInferencer, InferenceStats,
};
use crate::models::FileEvent;
use crate::resolve::{DiffResolver, ResolutionStats};
use crate::source::LogSource;
use crate::workspace::WorkingCopy;

#[derive(Debug, Default, Clone)]
pub struct PipelineReport {
    pub assembly: AssemblyStats,
    pub inference: InferenceStats,
    pub resolution: ResolutionStats,
    /// Files that produced an event list.
    pub files: usize,
    /// Total events across all files.
    pub events: usize,
}

#[derive(Debug)]
pub struct PipelineOutput {
    /// Chronological event lists, keyed by repository path.
    pub histories: BTreeMap<String, Vec<FileEvent>>,
    pub report: PipelineReport,
}

pub struct Pipeline<'a> {
    working_copy: &'a dyn WorkingCopy,
    client: Arc<dyn DiffClient>,
    config: ProjectConfig,
    cache_document: PathBuf,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        working_copy: &'a dyn WorkingCopy,
        client: Arc<dyn DiffClient>,
        config: ProjectConfig,
        cache_document: PathBuf,
    ) -> Self {
        Self {
            working_copy,
            client,
            config,
            cache_document,
        }
    }

    pub fn run<S: LogSource>(
        &self,
        source: S,
        progress: Option<ProgressBar>,
    ) -> Result<PipelineOutput> {
        let mut report = PipelineReport::default();

        let filter = PathFilter::from_config(&self.config.filters);
        let mut assembler = HistoryAssembler::new(filter);
        assembler
            .consume(source)
            .context("activity log is structurally invalid")?;
        report.assembly = assembler.stats();
        let window_start = assembler.window_start();
        let latest_revision = assembler.latest_revision();
        let mut histories = assembler.into_histories();
        info!(
            events = report.assembly.events,
            paths = report.assembly.paths,
            filtered = report.assembly.filtered,
            latest_revision,
            "assembled revision histories"
        );

        let inferencer = ImplicitActionInferencer::new(self.working_copy);
        report.inference = inferencer.run(&mut histories);
        debug!(
            inserted = report.inference.inserted,
            double_deletions = report.inference.double_deletions_removed,
            over_insertions = report.inference.over_insertions_removed,
            directories = report.inference.directories_removed,
            "implicit action inference finished"
        );

        let resolver = DiffResolver::new(
            Arc::clone(&self.client),
            LineCountCache::load(&self.cache_document),
            self.cache_document.clone(),
            self.config.resolve.clone(),
        );
        report.resolution =
            resolver.run(&mut histories, self.working_copy, latest_revision, progress)?;

        let window_start = match window_start {
            Some(start) => start,
            // Empty log: nothing to finalize.
            None => {
                return Ok(PipelineOutput {
                    histories: BTreeMap::new(),
                    report,
                })
            }
        };

        let mut finished = BTreeMap::new();
        for (path, history) in &histories {
            let live_lines = if self.working_copy.exists(path) {
                self.working_copy.line_count(path)
            } else {
                None
            };
            if let Some(events) = history.finalize(window_start, live_lines) {
                report.events += events.len();
                finished.insert(path.clone(), events);
            }
        }
        report.files = finished.len();
        info!(
            files = report.files,
            events = report.events,
            "finalized file histories"
        );

        Ok(PipelineOutput {
            histories: finished,
            report,
        })
    }
}
