//! External diff invocation and line counting
//!
//! The mechanism that produces a diff is an external collaborator: anything
//! that, given two revision identifiers and a path, returns raw diff text
//! or fails with a distinguishable binary-content error. [`DiffClient`] is
//! the seam; [`CommandDiffClient`] shells out to the VCS command line, and
//! tests substitute scripted implementations.

use std::path::PathBuf;
use std::process::Command;

use crate::errors::DiffError;

/// Issues one external diff call between two revisions of a path.
pub trait DiffClient: Send + Sync {
    fn diff(&self, path: &str, old_revision: u64, new_revision: u64)
        -> Result<String, DiffError>;
}

/// Marker the VCS prints instead of diff text for binary content.
const BINARY_MARKER: &str = "Cannot display: file marked as a binary type";

/// [`DiffClient`] backed by the `svn` command line, run from the checkout
/// root so repository paths resolve.
pub struct CommandDiffClient {
    program: String,
    checkout_root: PathBuf,
}

impl CommandDiffClient {
    pub fn new(checkout_root: impl Into<PathBuf>) -> Self {
        Self {
            program: "svn".to_string(),
            checkout_root: checkout_root.into(),
        }
    }

    /// Override the executable, e.g. a wrapper script.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl DiffClient for CommandDiffClient {
    fn diff(
        &self,
        path: &str,
        old_revision: u64,
        new_revision: u64,
    ) -> Result<String, DiffError> {
        let relative = path.trim_start_matches('/');
        let output = Command::new(&self.program)
            .args([
                "diff",
                "--non-interactive",
                "-r",
                &format!("{}:{}", old_revision, new_revision),
                relative,
            ])
            .current_dir(&self.checkout_root)
            .output()?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.contains(BINARY_MARKER) {
            return Err(DiffError::BinaryContent {
                path: path.to_string(),
                revision: new_revision,
            });
        }

        if !output.status.success() {
            return Err(DiffError::Tool {
                path: path.to_string(),
                old_revision,
                new_revision,
                message: String::from_utf8_lossy(&output.stderr)
                    .lines()
                    .next()
                    .unwrap_or("unknown failure")
                    .to_string(),
            });
        }

        Ok(stdout.into_owned())
    }
}

/// Count added and removed lines in raw unified-diff text.
///
/// Lines whose first character is `+` or `-` are counted, net of the one
/// `+++`/`---` header line each changed block contributes.
pub fn count_diff_lines(text: &str) -> (u64, u64) {
    let mut added = 0u64;
    let mut removed = 0u64;
    let mut add_headers = 0u64;
    let mut del_headers = 0u64;
    for line in text.lines() {
        match line.bytes().next() {
            Some(b'+') => {
                added += 1;
                if line.starts_with("+++") {
                    add_headers += 1;
                }
            }
            Some(b'-') => {
                removed += 1;
                if line.starts_with("---") {
                    del_headers += 1;
                }
            }
            _ => {}
        }
    }
    (
        added.saturating_sub(add_headers),
        removed.saturating_sub(del_headers),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Index: x.txt
===================================================================
--- x.txt\t(revision 10)
+++ x.txt\t(revision 15)
@@ -1,3 +1,6 @@
 context
-old line
+new line
+another line
+third line
+fourth line
 more context
";

    #[test]
    fn counts_plus_and_minus_net_of_headers() {
        let (added, removed) = count_diff_lines(SAMPLE);
        assert_eq!(added, 4);
        assert_eq!(removed, 1);
    }

    #[test]
    fn empty_diff_counts_zero() {
        assert_eq!(count_diff_lines(""), (0, 0));
    }

    #[test]
    fn pure_addition() {
        let text = "--- a\t(revision 0)\n+++ a\t(revision 1)\n@@ -0,0 +1,2 @@\n+one\n+two\n";
        assert_eq!(count_diff_lines(text), (2, 0));
    }

    #[test]
    fn multiple_blocks_each_discount_one_header() {
        let text = "\
--- a\t(revision 1)
+++ a\t(revision 2)
@@ -1 +1 @@
-x
+y
--- b\t(revision 1)
+++ b\t(revision 2)
@@ -1 +1 @@
-p
+q
";
        assert_eq!(count_diff_lines(text), (2, 2));
    }
}
