//! Analyze command implementation
//!
//! The full reconstruction run:
//! 1. Read the activity log (file or stdin)
//! 2. Assemble per-file revision histories
//! 3. Infer records implied by directory-level operations
//! 4. Resolve line counts through the cache and the external diff tool
//! 5. Emit the chronological histories (text or json)

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::cache::paths::{cache_root, RepositoryIndex};
use crate::config::load_project_config;
use crate::diff::{CommandDiffClient, DiffClient};
use crate::models::{EventKind, FileEvent};
use crate::pipeline::{Pipeline, PipelineOutput};
use crate::source::JsonLogReader;
use crate::workspace::{FsWorkingCopy, WorkingCopy};

pub fn run(
    path: &Path,
    log: &Path,
    output: Option<&Path>,
    format: &str,
    diff_program: &str,
    workers: Option<usize>,
    no_progress: bool,
) -> Result<()> {
    let start = Instant::now();

    let repo_root = path
        .canonicalize()
        .with_context(|| format!("working copy not found: {}", path.display()))?;
    let mut config = load_project_config(&repo_root);
    if let Some(workers) = workers {
        config.resolve.workers = workers;
    }

    let working_copy = FsWorkingCopy::new(&repo_root);
    let repository_id = working_copy.repository_id();

    let root = cache_root(config.cache.root.as_deref());
    let mut index = RepositoryIndex::load(&root);
    let document = index.document_for(&root, &repository_id);
    index.save(&root)?;

    let client: Arc<dyn DiffClient> =
        Arc::new(CommandDiffClient::new(&repo_root).with_program(diff_program));

    let progress = if no_progress {
        None
    } else {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}",
            )?
            .progress_chars("=>-"),
        );
        pb.set_message("resolving line counts");
        Some(pb)
    };

    let reader: Box<dyn BufRead> = if log == Path::new("-") {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(File::open(log).with_context(|| {
            format!("cannot open activity log: {}", log.display())
        })?))
    };

    let pipeline = Pipeline::new(&working_copy, client, config, document);
    let result = pipeline.run(JsonLogReader::new(reader), progress.clone())?;

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    match output {
        Some(file) => {
            let mut out = BufWriter::new(
                File::create(file)
                    .with_context(|| format!("cannot create output file: {}", file.display()))?,
            );
            emit(&result, format, &mut out)?;
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            emit(&result, format, &mut out)?;
        }
    }

    let report = &result.report;
    eprintln!(
        "{} {} files, {} events in {:.1}s ({} cache hits, {} diff calls, {} unresolved)",
        style("done:").green().bold(),
        report.files,
        report.events,
        start.elapsed().as_secs_f64(),
        report.resolution.cache_hits,
        report.resolution.diff_calls,
        report.resolution.failed,
    );

    Ok(())
}

fn emit(result: &PipelineOutput, format: &str, out: &mut dyn Write) -> Result<()> {
    match format {
        "json" => {
            serde_json::to_writer_pretty(&mut *out, &result.histories)?;
            writeln!(out)?;
        }
        "text" => render_text(&result.histories, out)?,
        other => bail!("unknown output format: {other}"),
    }
    Ok(())
}

fn kind_label(kind: &EventKind) -> &'static str {
    match kind {
        EventKind::Created => "created",
        EventKind::Changed => "changed",
        EventKind::Deleted => "deleted",
        EventKind::BeginOfLog => "baseline",
    }
}

fn render_text(
    histories: &BTreeMap<String, Vec<FileEvent>>,
    out: &mut dyn Write,
) -> io::Result<()> {
    for (path, events) in histories {
        writeln!(out, "{}", style(path).bold())?;
        for ev in events {
            let marker = if ev.implicit { "*" } else { " " };
            writeln!(
                out,
                "  r{:<7}{} {:<8} {:<12} {}  +{} -{} ={}",
                ev.revision,
                marker,
                kind_label(&ev.kind),
                ev.author,
                ev.timestamp.format("%Y-%m-%d %H:%M"),
                ev.lines_added,
                ev.lines_removed,
                ev.lines_total,
            )?;
        }
        writeln!(out)?;
    }
    Ok(())
}
