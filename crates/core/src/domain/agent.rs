// Agent Process Domain Model

use serde::{Deserialize, Serialize};

/// OS process id
pub type Pid = u32;

/// Activity classification shared by heuristic and wrapper signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityState {
    Working,
    Waiting,
    Stalled,
    Idle,
    Unknown,
}

impl std::fmt::Display for ActivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivityState::Working => write!(f, "WORKING"),
            ActivityState::Waiting => write!(f, "WAITING"),
            ActivityState::Stalled => write!(f, "STALLED"),
            ActivityState::Idle => write!(f, "IDLE"),
            ActivityState::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Activity signal pushed by the agent-side wrapper, keyed by pid.
/// Owned by the push source; the core only merges and expires it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrapperState {
    pub pid: Pid,
    pub state: ActivityState,
    pub last_output_at: Option<i64>, // epoch ms
    #[serde(default)]
    pub recent_output: Vec<String>,
    #[serde(default)]
    pub awaiting_user: bool,
    pub cmdline: Option<String>,
    pub cwd: Option<String>,
    pub start_time: Option<i64>, // epoch ms
    pub label: Option<String>,
    #[serde(default)]
    pub received_at: i64, // epoch ms, stamped by the store
}

impl WrapperState {
    pub fn new(pid: Pid, state: ActivityState) -> Self {
        Self {
            pid,
            state,
            last_output_at: None,
            recent_output: Vec::new(),
            awaiting_user: false,
            cmdline: None,
            cwd: None,
            start_time: None,
            label: None,
            received_at: 0,
        }
    }

    /// Unexpired while `now - received_at <= ttl_ms`
    pub fn is_fresh(&self, now_ms: i64, ttl_ms: i64) -> bool {
        now_ms.saturating_sub(self.received_at) <= ttl_ms
    }
}

/// Sandbox flags attached by an external sandbox manager
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxFlags {
    pub sandboxed: bool,
    pub network_restricted: bool,
    pub profile: Option<String>,
}

/// One tracked agent process as seen in a single scan cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProcess {
    // Identity (ephemeral: pids are reused by the OS)
    pub pid: Pid,
    pub label: String,
    pub command_line: String,
    pub exe_path: String,
    pub start_time: Option<i64>, // epoch ms

    // Metrics
    pub cpu_percent: Option<f32>,
    pub rss_kb: Option<u64>,
    pub threads: Option<u32>,
    pub tty: Option<String>,
    pub cwd: Option<String>,
    pub repo_path: Option<String>,

    // Classification
    pub heuristic_state: ActivityState,
    pub quiet_seconds: u64,
    pub first_seen_at: i64, // epoch ms
    pub wrapper_state: Option<WrapperState>,
    pub sandbox: Option<SandboxFlags>,

    /// Authoritative display state: wrapper state when present, heuristic otherwise
    pub state: ActivityState,
    pub awaiting_user: bool,
}

impl AgentProcess {
    /// Merge a fresh wrapper state on top of scanner-derived fields.
    /// Heuristic fields are kept alongside.
    pub fn merge_wrapper(&mut self, wrapper: &WrapperState) {
        self.state = wrapper.state;
        self.awaiting_user = wrapper.awaiting_user;
        self.wrapper_state = Some(wrapper.clone());
    }

    /// Build an agent entry from a wrapper state alone (pid not seen by the scanner)
    pub fn from_wrapper(wrapper: &WrapperState) -> Self {
        let command_line = wrapper.cmdline.clone().unwrap_or_default();
        let exe_path = command_line
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();

        let mut agent = Self {
            pid: wrapper.pid,
            label: wrapper.label.clone().unwrap_or_else(|| "wrapped".to_string()),
            command_line,
            exe_path,
            start_time: wrapper.start_time,
            cpu_percent: None,
            rss_kb: None,
            threads: None,
            tty: None,
            cwd: wrapper.cwd.clone(),
            repo_path: None,
            heuristic_state: ActivityState::Unknown,
            quiet_seconds: 0,
            first_seen_at: wrapper.received_at,
            wrapper_state: None,
            sandbox: None,
            state: ActivityState::Unknown,
            awaiting_user: false,
        };
        agent.merge_wrapper(wrapper);
        agent
    }
}
