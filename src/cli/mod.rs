//! CLI command definitions and handlers

pub(crate) mod analyze;
mod clean;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

const MAX_WORKERS: usize = 64;

/// Value parser for `--workers`.
fn parse_workers(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("at least one worker is required".into()),
        Ok(n) if n > MAX_WORKERS => {
            Err(format!("more than {} workers is not supported", MAX_WORKERS))
        }
        Ok(n) => Ok(n),
        Err(_) => Err(format!("'{}' is not a number", s)),
    }
}

/// Revchron - per-file history reconstruction from version-control logs
#[derive(Parser, Debug)]
#[command(name = "revchron")]
#[command(
    version,
    about = "Reconstruct per-file creation/modification/deletion histories, with line counts, from a repository activity log",
    after_help = "\
Examples:
  revchron analyze --log activity.json           Reconstruct histories for the current checkout
  revchron analyze --log - --format json         Read the log from stdin, emit JSON
  revchron analyze --log activity.json -o out.json --format json
  revchron clean                                 Drop the cached line counts for this checkout
  revchron clean --all                           Drop every cached document"
)]
pub struct Cli {
    /// Path to the checked-out working copy (default: current directory)
    #[arg(global = true, default_value = ".")]
    pub path: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    /// Worker threads for diff resolution (1-64, default from config)
    #[arg(long, global = true, value_parser = parse_workers)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconstruct file histories from an activity log
    #[command(after_help = "\
Examples:
  revchron analyze --log activity.json                 Text report to stdout
  revchron analyze --log activity.json --format json   Machine-readable histories
  revchron analyze --log - --no-progress               Pipe-friendly: stdin log, no bar
  revchron analyze --diff-program ./fake-svn           Substitute the diff tool")]
    Analyze {
        /// Activity log to read, JSON lines (use - for stdin)
        #[arg(long, short = 'l', default_value = "-")]
        log: PathBuf,

        /// Output file path (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Output format: text, json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,

        /// Executable used for revision diffs
        #[arg(long, default_value = "svn")]
        diff_program: String,

        /// Disable the progress bar (cleaner for CI logs)
        #[arg(long)]
        no_progress: bool,
    },

    /// Remove cached line-count documents
    Clean {
        /// Remove the documents of every known repository, not just this one
        #[arg(long)]
        all: bool,

        /// Show what would be removed without deleting anything
        #[arg(long)]
        dry_run: bool,
    },
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Analyze {
            log,
            output,
            format,
            diff_program,
            no_progress,
        } => analyze::run(
            &cli.path,
            &log,
            output.as_deref(),
            &format,
            &diff_program,
            cli.workers,
            no_progress,
        ),
        Commands::Clean { all, dry_run } => clean::run(&cli.path, all, dry_run),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workers_parser_enforces_bounds() {
        assert_eq!(parse_workers("1"), Ok(1));
        assert_eq!(parse_workers("64"), Ok(64));
        assert!(parse_workers("0").is_err());
        assert!(parse_workers("65").is_err());
        assert!(parse_workers("lots").is_err());
    }
}
