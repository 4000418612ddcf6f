// RepoScanner - discovery, adaptive rescans and backoff over GitProbe

mod discovery;
mod porcelain;

pub use discovery::{discover_repos, DiscoveryReport};
pub use porcelain::{
    detect_special_states, parse_ahead_behind, parse_porcelain, resolve_git_dir, PorcelainSummary,
};

use futures::future::join_all;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::application::backoff::{BackoffPolicy, BackoffState};
use crate::config::RepoScanConfig;
use crate::domain::{DiscoveryError, GitObservation, RepoStatus};
use crate::port::{GitProbe, ProbeError, TimeProvider};

const STATUS_ARGS: &[&str] = &["status", "--porcelain=v1", "--branch"];
const UPSTREAM_ARGS: &[&str] = &["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"];
const AHEAD_BEHIND_ARGS: &[&str] = &["rev-list", "--left-right", "--count", "HEAD...@{u}"];

/// Point-in-time copy of the scanner's repository map, ready to publish
#[derive(Debug, Clone, Default)]
pub struct RepoScanSnapshot {
    /// Increases with every snapshot taken; a publisher drops older generations
    pub generation: u64,
    pub repos: BTreeMap<String, RepoStatus>,
    pub discovery_errors: Vec<DiscoveryError>,
    pub ignored_count: usize,
}

/// Result of one rescan tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanCycleReport {
    pub scanned: usize,
    pub failed: usize,
    pub changed: usize,
}

/// Scheduling view of one repository (for diagnostics and tests)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepoSchedule {
    pub next_due_at: i64,
    pub backoff_delay_ms: u64,
    pub consecutive_failures: u32,
}

struct RepoEntry {
    status: RepoStatus,
    backoff: BackoffState,
    next_due_at: i64,
    in_flight: bool,
}

#[derive(Default)]
struct ScannerState {
    repos: BTreeMap<String, RepoEntry>,
    discovery_errors: Vec<DiscoveryError>,
    ignored_count: usize,
    snapshots_taken: u64,
}

/// Maintains path -> RepoStatus, refreshed continuously
pub struct RepoScanner {
    config: RepoScanConfig,
    git: Arc<dyn GitProbe>,
    time_provider: Arc<dyn TimeProvider>,
    backoff: BackoffPolicy,
    state: Mutex<ScannerState>,
}

impl RepoScanner {
    pub fn new(
        config: RepoScanConfig,
        git: Arc<dyn GitProbe>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        let backoff = BackoffPolicy::new(config.backoff_base_ms, config.backoff_cap_ms);
        Self {
            config,
            git,
            time_provider,
            backoff,
            state: Mutex::new(ScannerState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScannerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Walk the configured roots and reconcile the repository map.
    /// New repositories are due immediately; vanished ones are removed.
    pub async fn discover(&self) -> DiscoveryReport {
        let roots = self.config.roots.clone();
        let ignore = self.config.ignore_dirs.clone();
        let max_depth = self.config.max_depth;

        let report = match tokio::task::spawn_blocking(move || discover_repos(&roots, &ignore, max_depth)).await
        {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Discovery task failed");
                return DiscoveryReport::default();
            }
        };

        self.apply_discovery(&report);
        report
    }

    /// Reconcile the map with a discovery result
    pub fn apply_discovery(&self, report: &DiscoveryReport) {
        let now = self.time_provider.now_millis();
        let mut state = self.lock();

        let keep: std::collections::HashSet<String> = report
            .repos
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();

        let before = state.repos.len();
        state.repos.retain(|path, _| keep.contains(path));
        let removed = before - state.repos.len();

        let mut added = 0;
        for path in &report.repos {
            let key = path.to_string_lossy().into_owned();
            state.repos.entry(key).or_insert_with(|| {
                added += 1;
                RepoEntry {
                    status: RepoStatus::discovered(path),
                    backoff: BackoffState::default(),
                    next_due_at: now,
                    in_flight: false,
                }
            });
        }

        state.discovery_errors = report.errors.clone();
        state.ignored_count = report.ignored_count;

        info!(
            repos = state.repos.len(),
            added,
            removed,
            errors = report.errors.len(),
            ignored = report.ignored_count,
            "Repository discovery complete"
        );
    }

    /// Rescan every repository whose interval and backoff have elapsed.
    /// Each repository is scanned at most once per call; git calls run concurrently,
    /// bounded by the probe's own pool.
    pub async fn scan_due(&self) -> ScanCycleReport {
        let now = self.time_provider.now_millis();
        let due: Vec<PathBuf> = {
            let mut state = self.lock();
            state
                .repos
                .iter_mut()
                .filter(|(_, entry)| !entry.in_flight && entry.next_due_at <= now)
                .map(|(path, entry)| {
                    entry.in_flight = true;
                    PathBuf::from(path)
                })
                .collect()
        };

        if due.is_empty() {
            return ScanCycleReport::default();
        }
        debug!(count = due.len(), "Scanning due repositories");

        let results = join_all(due.into_iter().map(|path| async move {
            let result = self.collect(&path).await;
            (path, result)
        }))
        .await;

        let finished_at = self.time_provider.now_millis();
        let mut report = ScanCycleReport::default();
        let mut state = self.lock();
        for (path, result) in results {
            let key = path.to_string_lossy().into_owned();
            // Removed by a concurrent discovery pass
            let Some(entry) = state.repos.get_mut(&key) else {
                continue;
            };
            entry.in_flight = false;
            report.scanned += 1;

            match result {
                Ok(observation) => {
                    if self.apply_success(entry, &observation, finished_at) {
                        report.changed += 1;
                    }
                }
                Err(err) => {
                    report.failed += 1;
                    self.apply_failure(entry, &err, finished_at);
                }
            }
        }

        report
    }

    fn apply_success(&self, entry: &mut RepoEntry, observation: &GitObservation, now: i64) -> bool {
        let first_scan = entry.status.last_scan_time.is_none();
        let changed = observation.apply_to(&mut entry.status) || first_scan;

        entry.status.last_scan_time = Some(now);
        if changed {
            entry.status.last_change_time = Some(now);
        }
        entry.status.health = Default::default();
        entry.backoff.reset();

        let interval = if entry.status.needs_fast_refresh() {
            self.config.fast_refresh()
        } else {
            self.config.slow_refresh()
        };
        entry.next_due_at = now + interval.as_millis() as i64;

        debug!(
            repo = %entry.status.path,
            dirty = entry.status.dirty,
            next_due_in_ms = interval.as_millis() as u64,
            "Repository scanned"
        );
        changed
    }

    fn apply_failure(&self, entry: &mut RepoEntry, err: &ProbeError, now: i64) {
        let delay = entry.backoff.record_failure(&self.backoff);
        let until = now + delay as i64;

        // Counts from the last successful scan are kept
        entry.status.health.last_error = Some(err.to_string());
        entry.status.health.timed_out = err.is_timeout();
        entry.status.health.backoff_until = Some(until);
        entry.next_due_at = until;

        warn!(
            repo = %entry.status.path,
            error = %err,
            failures = entry.backoff.consecutive_failures(),
            backoff_ms = delay,
            "Repository scan failed"
        );
    }

    /// Collect status, special states and upstream for one repository
    pub async fn collect(&self, repo: &Path) -> Result<GitObservation, ProbeError> {
        let fast = self.config.git_fast_timeout();

        let status_out = self.git.run(repo, STATUS_ARGS, fast).await?;
        let summary = parse_porcelain(&status_out).map_err(ProbeError::Failed)?;

        let mut special = resolve_git_dir(repo)
            .map(|dir| detect_special_states(&dir))
            .unwrap_or_default();
        special.conflict = summary.conflict;

        let upstream = match self.git.run(repo, UPSTREAM_ARGS, fast).await {
            Ok(out) => Some(out.trim().to_string()).filter(|s| !s.is_empty()),
            Err(err) if err.is_timeout() => return Err(err),
            // No upstream configured
            Err(_) => None,
        };

        let (ahead, behind) = if upstream.is_some() {
            let out = self
                .git
                .run(repo, AHEAD_BEHIND_ARGS, self.config.git_slow_timeout())
                .await?;
            let (ahead, behind) = parse_ahead_behind(&out).map_err(ProbeError::Failed)?;
            (Some(ahead), Some(behind))
        } else {
            (None, None)
        };

        Ok(GitObservation {
            branch: summary.branch,
            staged: summary.staged,
            unstaged: summary.unstaged,
            untracked: summary.untracked,
            special,
            upstream,
            ahead,
            behind,
        })
    }

    /// Copy of the current map for publishing
    pub fn snapshot(&self) -> RepoScanSnapshot {
        let mut state = self.lock();
        state.snapshots_taken += 1;
        RepoScanSnapshot {
            generation: state.snapshots_taken,
            repos: state
                .repos
                .iter()
                .map(|(path, entry)| (path.clone(), entry.status.clone()))
                .collect(),
            discovery_errors: state.discovery_errors.clone(),
            ignored_count: state.ignored_count,
        }
    }

    pub fn schedule(&self, repo: &Path) -> Option<RepoSchedule> {
        let state = self.lock();
        state
            .repos
            .get(repo.to_string_lossy().as_ref())
            .map(|entry| RepoSchedule {
                next_due_at: entry.next_due_at,
                backoff_delay_ms: entry.backoff.current_delay_ms(),
                consecutive_failures: entry.backoff.consecutive_failures(),
            })
    }
}
