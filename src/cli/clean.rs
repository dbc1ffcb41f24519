//! Clean command - remove cached line-count documents

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::cache::paths::{cache_root, RepositoryIndex};
use crate::config::load_project_config;
use crate::workspace::repository_id_for;

pub fn run(path: &Path, all: bool, dry_run: bool) -> Result<()> {
    let config = load_project_config(path);
    let root = cache_root(config.cache.root.as_deref());
    let mut index = RepositoryIndex::load(&root);

    let targets: Vec<(String, String)> = if all {
        index
            .entries()
            .map(|(id, file)| (id.to_string(), file.to_string()))
            .collect()
    } else {
        let repo_root = path
            .canonicalize()
            .with_context(|| format!("working copy not found: {}", path.display()))?;
        let id = repository_id_for(&repo_root);
        match index.get(&id) {
            Some(file) => vec![(id, file.to_string())],
            None => {
                println!("No cached document for {}.", repo_root.display());
                return Ok(());
            }
        }
    };

    if targets.is_empty() {
        println!("Cache is empty, nothing to remove.");
        return Ok(());
    }

    println!(
        "Found {} cached document{}:",
        targets.len(),
        if targets.len() == 1 { "" } else { "s" }
    );
    for (id, file) in &targets {
        println!("  {}  ({})", root.join(file).display(), id);
    }

    if dry_run {
        println!("\nDry run - nothing removed. Run without --dry-run to delete.");
        return Ok(());
    }

    println!();
    let mut removed = 0usize;
    for (id, file) in &targets {
        let document = root.join(file);
        match fs::remove_file(&document) {
            Ok(()) => {
                index.remove(id);
                removed += 1;
                println!("Removed: {}", document.display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Already gone, forget the stale index entry too.
                index.remove(id);
                removed += 1;
            }
            Err(e) => eprintln!("Failed to remove {}: {}", document.display(), e),
        }
    }
    index.save(&root)?;

    println!(
        "\nCleaned {} document{}.",
        removed,
        if removed == 1 { "" } else { "s" }
    );

    Ok(())
}
