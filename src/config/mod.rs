//! Project-level configuration support
//!
//! Loads per-checkout configuration from a `revchron.toml` file in the
//! working-copy root. Missing file means defaults; a malformed file is
//! logged and ignored rather than failing the run.
//!
//! # Configuration Format
//!
//! ```toml
//! # revchron.toml
//!
//! [filters]
//! include = ["^/trunk/"]
//! exclude = ["\\.min\\.js$", "^/tags/"]
//!
//! [resolve]
//! workers = 8
//! parallel_threshold_ms = 500
//! snapshot_interval_secs = 60
//! pool_deadline_hours = 96
//!
//! [cache]
//! root = "/var/cache/revchron"
//! ```

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

/// Config file name looked up in the working-copy root.
pub const CONFIG_FILE: &str = "revchron.toml";

/// Project-level configuration loaded from `revchron.toml`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProjectConfig {
    #[serde(default)]
    pub filters: FilterConfig,

    #[serde(default)]
    pub resolve: ResolveConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

/// Path inclusion/exclusion patterns applied to logged repository paths.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FilterConfig {
    /// Regexes a path must match (any of) to be kept. Empty keeps everything.
    #[serde(default)]
    pub include: Vec<String>,

    /// Regexes that drop a path even when included.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Tuning for the diff-resolution phase.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolveConfig {
    /// Worker threads once the scheduler switches to the pool.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// One external call slower than this flips scheduling to the pool.
    #[serde(default = "default_parallel_threshold_ms")]
    pub parallel_threshold_ms: u64,

    /// Cache snapshots to disk at most this often.
    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,

    /// How long to wait for outstanding pool units before declaring the
    /// phase complete. Full historical scans against a remote server can
    /// legitimately run for days.
    #[serde(default = "default_pool_deadline_hours")]
    pub pool_deadline_hours: u64,

    /// Bounded channel capacity between submitter and workers.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_parallel_threshold_ms() -> u64 {
    500
}

fn default_snapshot_interval_secs() -> u64 {
    60
}

fn default_pool_deadline_hours() -> u64 {
    96
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            parallel_threshold_ms: default_parallel_threshold_ms(),
            snapshot_interval_secs: default_snapshot_interval_secs(),
            pool_deadline_hours: default_pool_deadline_hours(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Cache placement overrides.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CacheConfig {
    /// Override for the cache root (default: platform cache dir).
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// Load project configuration from the working-copy root.
///
/// Missing file returns defaults silently; a file that fails to parse logs a
/// warning and returns defaults, so a stray edit never blocks a run.
pub fn load_project_config(repo_path: &Path) -> ProjectConfig {
    let config_path = repo_path.join(CONFIG_FILE);
    if !config_path.exists() {
        debug!("No {} found, using defaults", CONFIG_FILE);
        return ProjectConfig::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str::<ProjectConfig>(&content) {
            Ok(config) => {
                debug!("Loaded project config from {}", config_path.display());
                config
            }
            Err(e) => {
                warn!("Failed to parse {}: {}", config_path.display(), e);
                ProjectConfig::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {}: {}", config_path.display(), e);
            ProjectConfig::default()
        }
    }
}

/// Compiled include/exclude matcher for logged repository paths.
#[derive(Debug, Default)]
pub struct PathFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl PathFilter {
    /// Compile the configured patterns. Invalid regexes are logged and
    /// dropped rather than failing the run.
    pub fn from_config(filters: &FilterConfig) -> Self {
        Self {
            include: compile_patterns(&filters.include, "include"),
            exclude: compile_patterns(&filters.exclude, "exclude"),
        }
    }

    /// Keep a path when it matches any include (or includes are empty) and
    /// matches no exclude.
    pub fn matches(&self, path: &str) -> bool {
        let included =
            self.include.is_empty() || self.include.iter().any(|re| re.is_match(path));
        included && !self.exclude.iter().any(|re| re.is_match(path))
    }
}

fn compile_patterns(patterns: &[String], which: &str) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!("Ignoring invalid {} pattern {:?}: {}", which, p, e);
                None
            }
        })
        .collect()
}
