// Git Probe Port
// Abstraction for invoking git subcommands under a hard timeout

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use super::ProbeError;

/// Git probe trait
///
/// Implementations:
/// - GitCliProbe: spawns the git binary, bounded by a shared semaphore
/// - ScriptedGitProbe: canned replies for tests
#[async_trait]
pub trait GitProbe: Send + Sync {
    /// Run `git <args>` inside `repo` and return stdout
    ///
    /// # Errors
    /// - ProbeError::Timeout if the call exceeds `budget` (the subprocess is killed)
    /// - ProbeError::Failed on nonzero exit
    /// - ProbeError::Spawn if git cannot be started
    async fn run(&self, repo: &Path, args: &[&str], budget: Duration) -> Result<String, ProbeError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Canned reply for one git subcommand
    #[derive(Debug, Clone)]
    pub enum GitReply {
        Output(String),
        Fail(String),
        Timeout,
    }

    /// Scripted git probe keyed by (repo path, subcommand)
    ///
    /// Unscripted calls fail, which mirrors "no upstream configured" for rev-parse.
    #[derive(Default)]
    pub struct ScriptedGitProbe {
        replies: Mutex<HashMap<(String, String), GitReply>>,
        calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl ScriptedGitProbe {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set(&self, repo: &Path, subcommand: &str, reply: GitReply) {
            self.replies.lock().unwrap().insert(
                (repo.to_string_lossy().into_owned(), subcommand.to_string()),
                reply,
            );
        }

        /// Script a clean repository on `main` with no upstream
        pub fn set_clean(&self, repo: &Path) {
            self.set(repo, "status", GitReply::Output("## main\n".to_string()));
        }

        pub fn call_count(&self, repo: &Path) -> usize {
            let key = repo.to_string_lossy();
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(r, _)| *r == key)
                .count()
        }
    }

    #[async_trait]
    impl GitProbe for ScriptedGitProbe {
        async fn run(&self, repo: &Path, args: &[&str], budget: Duration) -> Result<String, ProbeError> {
            let repo_key = repo.to_string_lossy().into_owned();
            self.calls.lock().unwrap().push((
                repo_key.clone(),
                args.iter().map(|a| a.to_string()).collect(),
            ));

            let subcommand = args.first().copied().unwrap_or_default().to_string();
            let reply = self
                .replies
                .lock()
                .unwrap()
                .get(&(repo_key, subcommand.clone()))
                .cloned();

            match reply {
                Some(GitReply::Output(out)) => Ok(out),
                Some(GitReply::Fail(msg)) => Err(ProbeError::Failed(msg)),
                Some(GitReply::Timeout) => Err(ProbeError::Timeout {
                    budget_ms: budget.as_millis() as u64,
                }),
                None => Err(ProbeError::Failed(format!("no scripted reply for git {}", subcommand))),
            }
        }
    }
}
