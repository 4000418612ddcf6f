// Git subprocess probe
// reason: tokio::process for async spawn, Semaphore as the shared git pool
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, warn};

use agentwatch_core::port::{GitProbe, ProbeError};

/// Runs git subcommands with a hard timeout.
///
/// All calls share one counting semaphore: at most `max_concurrency` git
/// processes exist at a time and further calls queue. The timeout starts once
/// a permit is held. On expiry the child is killed (kill_on_drop).
pub struct GitCliProbe {
    binary: PathBuf,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
}

impl GitCliProbe {
    pub fn new(max_concurrency: usize) -> Self {
        Self::with_binary("git", max_concurrency)
    }

    /// Use a specific git executable
    pub fn with_binary(binary: impl Into<PathBuf>, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            binary: binary.into(),
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Permits not currently held by a running call
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl GitProbe for GitCliProbe {
    async fn run(&self, repo: &Path, args: &[&str], budget: Duration) -> Result<String, ProbeError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ProbeError::Failed("git pool closed".to_string()))?;

        let subcommand = args.first().copied().unwrap_or_default();
        let child = Command::new(&self.binary)
            .args(args)
            .current_dir(repo)
            // Never take index.lock
            .env("GIT_OPTIONAL_LOCKS", "0")
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProbeError::Spawn(format!("{}: {}", self.binary.display(), e)))?;

        match timeout(budget, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => {
                debug!(repo = %repo.display(), subcommand, "git call succeeded");
                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(ProbeError::Failed(format!(
                    "git {} exited with {}: {}",
                    subcommand,
                    output.status,
                    stderr.trim()
                )))
            }
            Ok(Err(e)) => Err(ProbeError::Failed(format!("git {}: {}", subcommand, e))),
            Err(_) => {
                warn!(
                    repo = %repo.display(),
                    subcommand,
                    budget_ms = budget.as_millis() as u64,
                    "git call timed out, killing"
                );
                Err(ProbeError::Timeout {
                    budget_ms: budget.as_millis() as u64,
                })
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::TempDir;

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_timeout_kills_and_fails() {
        // `sh -c` stands in for a hanging git binary
        let probe = GitCliProbe::with_binary("sh", 1);
        let tmp = TempDir::new().unwrap();

        let started = Instant::now();
        let result = probe
            .run(tmp.path(), &["-c", "sleep 5"], Duration::from_millis(100))
            .await;

        assert_eq!(result, Err(ProbeError::Timeout { budget_ms: 100 }));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(probe.available_permits(), 1, "permit released after timeout");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let probe = GitCliProbe::with_binary("sh", 1);
        let tmp = TempDir::new().unwrap();
        let result = probe
            .run(tmp.path(), &["-c", "echo nope >&2; exit 3"], Duration::from_secs(5))
            .await;

        match result {
            Err(ProbeError::Failed(msg)) => assert!(msg.contains("nope")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let probe = GitCliProbe::with_binary("/nonexistent/git-binary", 1);
        let tmp = TempDir::new().unwrap();
        let result = probe.run(tmp.path(), &["status"], Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ProbeError::Spawn(_))));
    }

    #[tokio::test]
    async fn test_calls_beyond_bound_queue() {
        let probe = Arc::new(GitCliProbe::with_binary("sh", 2));
        let tmp = TempDir::new().unwrap();

        let started = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let probe = probe.clone();
            let dir = tmp.path().to_path_buf();
            handles.push(tokio::spawn(async move {
                probe
                    .run(&dir, &["-c", "sleep 0.2"], Duration::from_secs(5))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Two waves of two
        assert!(started.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_real_git_status() {
        if !git_available() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let init = std::process::Command::new("git")
            .args(["init", "-q", "-b", "main"])
            .current_dir(tmp.path())
            .status()
            .unwrap();
        if !init.success() {
            return;
        }
        std::fs::write(tmp.path().join("new.txt"), "x").unwrap();

        let probe = GitCliProbe::new(2);
        let out = probe
            .run(tmp.path(), &["status", "--porcelain=v1", "--branch"], Duration::from_secs(5))
            .await
            .unwrap();

        assert!(out.contains("## No commits yet on main"));
        assert!(out.contains("?? new.txt"));
    }
}
