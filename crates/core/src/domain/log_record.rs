// Append-only log records derived from AgentProcess at logging time

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::agent::{ActivityState, AgentProcess, Pid};

/// Record kind, one file family per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Snapshots,
    Events,
}

impl LogKind {
    pub fn file_prefix(&self) -> &'static str {
        match self {
            LogKind::Snapshots => "snapshots",
            LogKind::Events => "events",
        }
    }

    pub fn all() -> [LogKind; 2] {
        [LogKind::Snapshots, LogKind::Events]
    }
}

/// Periodic per-agent snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSnapshot {
    pub recorded_at: DateTime<Utc>,
    pub pid: Pid,
    pub label: String,
    pub state: ActivityState,
    pub heuristic_state: ActivityState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapper_state: Option<ActivityState>,
    #[serde(default)]
    pub awaiting_user: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rss_kb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<u32>,
    #[serde(default)]
    pub quiet_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_ms: Option<i64>,
}

impl ProcessSnapshot {
    pub fn from_agent(agent: &AgentProcess, recorded_at: DateTime<Utc>) -> Self {
        let now_ms = recorded_at.timestamp_millis();
        Self {
            recorded_at,
            pid: agent.pid,
            label: agent.label.clone(),
            state: agent.state,
            heuristic_state: agent.heuristic_state,
            wrapper_state: agent.wrapper_state.as_ref().map(|w| w.state),
            awaiting_user: agent.awaiting_user,
            cpu_percent: agent.cpu_percent,
            rss_kb: agent.rss_kb,
            threads: agent.threads,
            quiet_seconds: agent.quiet_seconds,
            cwd: agent.cwd.clone(),
            repo_path: agent.repo_path.clone(),
            uptime_ms: agent.start_time.map(|start| (now_ms - start).max(0)),
        }
    }
}

/// Lifecycle transition kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    ProcessStart,
    ProcessEnd,
    StateChange,
}

/// Lifecycle transition event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessLifecycleEvent {
    pub recorded_at: DateTime<Utc>,
    pub event: LifecycleKind,
    pub pid: Pid,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_state: Option<ActivityState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_state: Option<ActivityState>,
}

impl ProcessLifecycleEvent {
    fn base(event: LifecycleKind, pid: Pid, label: &str, recorded_at: DateTime<Utc>) -> Self {
        Self {
            recorded_at,
            event,
            pid,
            label: label.to_string(),
            command_line: None,
            cwd: None,
            start_time: None,
            duration_ms: None,
            from_state: None,
            to_state: None,
        }
    }

    pub fn started(agent: &AgentProcess, recorded_at: DateTime<Utc>) -> Self {
        let mut event = Self::base(LifecycleKind::ProcessStart, agent.pid, &agent.label, recorded_at);
        event.command_line = Some(agent.command_line.clone());
        event.cwd = agent.cwd.clone();
        event.start_time = agent.start_time;
        event.to_state = Some(agent.state);
        event
    }

    /// `duration_ms` is omitted when the start time was never known
    pub fn ended(
        pid: Pid,
        label: &str,
        start_time: Option<i64>,
        last_state: ActivityState,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        let mut event = Self::base(LifecycleKind::ProcessEnd, pid, label, recorded_at);
        event.start_time = start_time;
        event.duration_ms = start_time.map(|start| (recorded_at.timestamp_millis() - start).max(0));
        event.from_state = Some(last_state);
        event
    }

    pub fn state_changed(
        agent: &AgentProcess,
        from: ActivityState,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        let mut event = Self::base(LifecycleKind::StateChange, agent.pid, &agent.label, recorded_at);
        event.from_state = Some(from);
        event.to_state = Some(agent.state);
        event
    }
}
