// Repository Domain Model

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Repository ID (UUID v5 of the absolute path)
pub type RepoId = String;

/// Derive the stable repository id from its absolute path
pub fn repo_id_for(path: &Path) -> RepoId {
    let raw = path.to_string_lossy();
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, raw.as_bytes()).to_string()
}

/// Git conditions that override a simple dirty/clean view.
/// Flags are independent: a rebase can be in progress while conflicts exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialStates {
    pub conflict: bool,
    pub rebase: bool,
    pub merge: bool,
    pub cherry_pick: bool,
    pub revert: bool,
}

impl SpecialStates {
    pub fn any(&self) -> bool {
        self.conflict || self.rebase || self.merge || self.cherry_pick || self.revert
    }
}

/// Scan health for a repository
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoHealth {
    pub last_error: Option<String>,
    pub timed_out: bool,
    pub backoff_until: Option<i64>, // epoch ms
}

/// Repository status entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoStatus {
    // Identity
    pub id: RepoId,
    pub path: String,
    pub name: String,

    // Working tree
    pub branch: Option<String>,
    pub staged_count: u32,
    pub unstaged_count: u32,
    pub untracked_count: u32,
    pub special: SpecialStates,
    pub dirty: bool,

    // Upstream tracking
    pub upstream: Option<String>,
    pub ahead: Option<u32>,
    pub behind: Option<u32>,

    pub last_scan_time: Option<i64>,   // epoch ms, last successful scan
    pub last_change_time: Option<i64>, // epoch ms, last fingerprint change

    pub health: RepoHealth,
}

impl RepoStatus {
    /// Create a fresh record for a newly discovered repository
    pub fn discovered(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            id: repo_id_for(path),
            path: path.to_string_lossy().into_owned(),
            name,
            branch: None,
            staged_count: 0,
            unstaged_count: 0,
            untracked_count: 0,
            special: SpecialStates::default(),
            dirty: false,
            upstream: None,
            ahead: None,
            behind: None,
            last_scan_time: None,
            last_change_time: None,
            health: RepoHealth::default(),
        }
    }

    /// dirty = staged + unstaged + untracked > 0 OR any special state
    pub fn compute_dirty(&self) -> bool {
        let changes = self.staged_count as u64 + self.unstaged_count as u64 + self.untracked_count as u64;
        changes > 0 || self.special.any()
    }

    /// Re-derive the stored `dirty` flag after counts or flags change
    pub fn refresh_dirty(&mut self) {
        self.dirty = self.compute_dirty();
    }

    /// Whether this repository should be polled at the fast interval
    pub fn needs_fast_refresh(&self) -> bool {
        self.dirty || self.special.any()
    }
}

/// Result of one successful git status collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitObservation {
    pub branch: Option<String>,
    pub staged: u32,
    pub unstaged: u32,
    pub untracked: u32,
    pub special: SpecialStates,
    pub upstream: Option<String>,
    pub ahead: Option<u32>,
    pub behind: Option<u32>,
}

impl GitObservation {
    /// Apply this observation to a record; returns true if anything visible changed
    pub fn apply_to(&self, status: &mut RepoStatus) -> bool {
        let changed = status.branch != self.branch
            || status.staged_count != self.staged
            || status.unstaged_count != self.unstaged
            || status.untracked_count != self.untracked
            || status.special != self.special
            || status.upstream != self.upstream
            || status.ahead != self.ahead
            || status.behind != self.behind;

        status.branch = self.branch.clone();
        status.staged_count = self.staged;
        status.unstaged_count = self.unstaged;
        status.untracked_count = self.untracked;
        status.special = self.special;
        status.upstream = self.upstream.clone();
        status.ahead = self.ahead;
        status.behind = self.behind;
        status.refresh_dirty();

        changed
    }
}

/// Unreadable directory encountered during discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryError {
    pub path: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_with(staged: u32, unstaged: u32, untracked: u32, special: SpecialStates) -> RepoStatus {
        let mut status = RepoStatus::discovered(Path::new("/tmp/ws/a"));
        status.staged_count = staged;
        status.unstaged_count = unstaged;
        status.untracked_count = untracked;
        status.special = special;
        status.refresh_dirty();
        status
    }

    #[test]
    fn test_dirty_truth_table() {
        // Every combination of zero/non-zero counts and each special flag
        for bits in 0u32..(1 << 8) {
            let staged = bits & 1;
            let unstaged = (bits >> 1) & 1;
            let untracked = (bits >> 2) & 1;
            let special = SpecialStates {
                conflict: bits & (1 << 3) != 0,
                rebase: bits & (1 << 4) != 0,
                merge: bits & (1 << 5) != 0,
                cherry_pick: bits & (1 << 6) != 0,
                revert: bits & (1 << 7) != 0,
            };

            let status = status_with(staged, unstaged, untracked, special);
            let expected = staged + unstaged + untracked > 0 || special.any();
            assert_eq!(status.dirty, expected, "bits={:08b}", bits);
        }
    }

    #[test]
    fn test_staged_and_untracked_is_dirty() {
        let status = status_with(2, 0, 3, SpecialStates::default());
        assert_eq!(status.staged_count, 2);
        assert_eq!(status.unstaged_count, 0);
        assert_eq!(status.untracked_count, 3);
        assert!(status.dirty);
    }

    #[test]
    fn test_repo_id_is_stable() {
        let a = repo_id_for(Path::new("/tmp/ws/a"));
        let b = repo_id_for(Path::new("/tmp/ws/a"));
        let c = repo_id_for(Path::new("/tmp/ws/b"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_discovered_record_name() {
        let status = RepoStatus::discovered(Path::new("/tmp/ws/project"));
        assert_eq!(status.name, "project");
        assert!(!status.dirty);
        assert!(status.last_scan_time.is_none());
    }

    #[test]
    fn test_observation_reports_change() {
        let mut status = RepoStatus::discovered(Path::new("/tmp/ws/a"));
        let obs = GitObservation {
            branch: Some("main".to_string()),
            staged: 1,
            ..Default::default()
        };

        assert!(obs.apply_to(&mut status));
        assert!(status.dirty);
        assert!(!obs.apply_to(&mut status), "same observation is not a change");
    }

    #[test]
    fn test_serializes_camel_case_health() {
        let mut status = RepoStatus::discovered(Path::new("/tmp/ws/a"));
        status.health.timed_out = true;
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["health"]["timedOut"], serde_json::json!(true));
        assert!(json.get("stagedCount").is_some());
    }
}
