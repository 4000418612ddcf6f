// Parsing of `git status --porcelain=v1 --branch` and on-disk git state

use std::path::{Path, PathBuf};

use crate::domain::SpecialStates;

/// Two-letter porcelain codes that mark an unmerged (conflicted) path
const CONFLICT_CODES: [&str; 7] = ["DD", "AU", "UD", "UA", "DU", "AA", "UU"];

/// Counts and branch parsed from porcelain output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PorcelainSummary {
    pub branch: Option<String>,
    pub staged: u32,
    pub unstaged: u32,
    pub untracked: u32,
    pub conflict: bool,
}

/// Parse porcelain v1 output with a `## ` branch header
///
/// Conflicted entries set `conflict` and count as unstaged.
/// Returns Err with a description on a line that is not porcelain.
pub fn parse_porcelain(output: &str) -> Result<PorcelainSummary, String> {
    let mut summary = PorcelainSummary::default();

    for line in output.lines() {
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix("## ") {
            summary.branch = parse_branch_header(header);
            continue;
        }

        let code = line
            .get(..2)
            .filter(|_| line.as_bytes().get(2) == Some(&b' '))
            .ok_or_else(|| format!("unparseable status line: {:?}", line))?;

        match code {
            "??" => summary.untracked += 1,
            "!!" => {}
            c if CONFLICT_CODES.contains(&c) => {
                summary.conflict = true;
                summary.unstaged += 1;
            }
            c => {
                let mut chars = c.chars();
                let index = chars.next().unwrap_or(' ');
                let worktree = chars.next().unwrap_or(' ');
                if index != ' ' {
                    summary.staged += 1;
                }
                if worktree != ' ' {
                    summary.unstaged += 1;
                }
            }
        }
    }

    Ok(summary)
}

/// Branch from the header: `main...origin/main [ahead 1]`, `No commits yet on main`,
/// `HEAD (no branch)`
fn parse_branch_header(header: &str) -> Option<String> {
    let header = header.trim();
    for prefix in ["No commits yet on ", "Initial commit on "] {
        if let Some(branch) = header.strip_prefix(prefix) {
            return Some(branch.trim().to_string());
        }
    }
    if header.starts_with("HEAD (no branch)") {
        return Some("HEAD".to_string());
    }

    let name = header
        .split("...")
        .next()
        .unwrap_or(header)
        .split_whitespace()
        .next()
        .unwrap_or_default();
    (!name.is_empty()).then(|| name.to_string())
}

/// Parse `git rev-list --left-right --count HEAD...@{u}` output into (ahead, behind)
pub fn parse_ahead_behind(output: &str) -> Result<(u32, u32), String> {
    let mut parts = output.split_whitespace();
    let ahead = parts.next().and_then(|s| s.parse().ok());
    let behind = parts.next().and_then(|s| s.parse().ok());
    match (ahead, behind) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(format!("unparseable ahead/behind: {:?}", output.trim())),
    }
}

/// Resolve the git directory of a working tree.
/// A `.git` file (worktree or submodule) is followed via its `gitdir:` line.
pub fn resolve_git_dir(repo: &Path) -> Option<PathBuf> {
    let dot_git = repo.join(".git");
    let meta = std::fs::metadata(&dot_git).ok()?;
    if meta.is_dir() {
        return Some(dot_git);
    }

    let contents = std::fs::read_to_string(&dot_git).ok()?;
    let target = contents
        .lines()
        .find_map(|line| line.strip_prefix("gitdir:"))
        .map(str::trim)
        .filter(|t| !t.is_empty())?;

    let target = PathBuf::from(target);
    Some(if target.is_absolute() {
        target
    } else {
        repo.join(target)
    })
}

/// Detect merge/rebase/cherry-pick/revert from marker files in the git directory
pub fn detect_special_states(git_dir: &Path) -> SpecialStates {
    SpecialStates {
        conflict: false,
        merge: git_dir.join("MERGE_HEAD").exists(),
        rebase: git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists(),
        cherry_pick: git_dir.join("CHERRY_PICK_HEAD").exists(),
        revert: git_dir.join("REVERT_HEAD").exists(),
    }
}
