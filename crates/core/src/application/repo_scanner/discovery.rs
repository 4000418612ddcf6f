// Repository discovery: walk roots, record directories holding `.git`

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::domain::DiscoveryError;

/// Outcome of one discovery pass over all roots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Sorted, deduplicated repository paths
    pub repos: Vec<PathBuf>,
    pub errors: Vec<DiscoveryError>,
    /// Directories skipped because of the ignore set or a leading `.`
    pub ignored_count: usize,
}

/// Walk every root and return the repositories found.
///
/// A repository is never descended into, so nested repositories are not reported.
/// Unreadable directories are recorded and skipped. Blocking: run on a blocking thread.
pub fn discover_repos(roots: &[PathBuf], ignore_dirs: &[String], max_depth: usize) -> DiscoveryReport {
    let ignore: HashSet<&str> = ignore_dirs.iter().map(String::as_str).collect();
    let mut found: HashSet<PathBuf> = HashSet::new();
    let mut report = DiscoveryReport::default();

    for root in roots {
        let mut walker = WalkDir::new(root)
            .follow_links(false)
            .max_depth(max_depth)
            .into_iter();

        loop {
            let entry = match walker.next() {
                None => break,
                Some(Ok(entry)) => entry,
                Some(Err(err)) => {
                    let path = err
                        .path()
                        .map(|p| p.to_string_lossy().into_owned())
                        .unwrap_or_else(|| root.to_string_lossy().into_owned());
                    debug!(path = %path, error = %err, "Skipping unreadable directory");
                    report.errors.push(DiscoveryError {
                        path,
                        message: err.to_string(),
                    });
                    continue;
                }
            };

            if !entry.file_type().is_dir() {
                continue;
            }

            if entry.depth() > 0 {
                let name = entry.file_name().to_string_lossy();
                if name.starts_with('.') || ignore.contains(name.as_ref()) {
                    report.ignored_count += 1;
                    walker.skip_current_dir();
                    continue;
                }
            }

            if is_repo_root(entry.path()) {
                found.insert(entry.path().to_path_buf());
                walker.skip_current_dir();
            }
        }
    }

    report.repos = found.into_iter().collect();
    report.repos.sort();
    report
}

fn is_repo_root(dir: &Path) -> bool {
    std::fs::symlink_metadata(dir.join(".git")).is_ok()
}
