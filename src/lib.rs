//! Revchron - per-file history reconstruction from version-control logs
//!
//! Reads a repository activity log, assembles a chronological biography for
//! every path it mentions, infers the records directory-level operations
//! imply, and resolves line-count deltas through a persistent cache backed
//! by an external diff tool.

pub mod cache;
pub mod cli;
pub mod config;
pub mod diff;
pub mod errors;
pub mod history;
pub mod models;
pub mod pipeline;
pub mod resolve;
pub mod source;
pub mod workspace;
