// ProcessLogger - best-effort recorder of agent lifecycle and periodic snapshots

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::application::store::{AgentChangeCause, AgentsChanged, DataStore};
use crate::domain::{ActivityState, AgentProcess, Pid, ProcessLifecycleEvent, ProcessSnapshot};
use crate::port::{ActivityLog, TimeProvider};

/// What the logger remembers about a pid from the previous cycle
#[derive(Debug, Clone)]
struct Seen {
    label: String,
    start_time: Option<i64>,
    state: ActivityState,
}

#[derive(Default)]
struct LoggerState {
    previous: HashMap<Pid, Seen>,
    cycles: u64,
    retention_day: Option<NaiveDate>,
}

/// Counts written by one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleLog {
    pub events: usize,
    pub snapshots: usize,
}

pub struct ProcessLogger {
    log: Arc<dyn ActivityLog>,
    time_provider: Arc<dyn TimeProvider>,
    snapshot_every: u64,
    state: Mutex<LoggerState>,
}

impl ProcessLogger {
    pub fn new(log: Arc<dyn ActivityLog>, time_provider: Arc<dyn TimeProvider>, snapshot_every: u64) -> Self {
        Self {
            log,
            time_provider,
            snapshot_every: snapshot_every.max(1),
            state: Mutex::new(LoggerState::default()),
        }
    }

    /// Subscribe to scan-cycle publishes of `store`
    pub fn attach(self: &Arc<Self>, store: &DataStore) {
        let logger = Arc::clone(self);
        store.on_agents_changed(move |change| logger.on_agents_changed(change));
    }

    /// Store callback: only scan cycles are recorded, wrapper pushes are not
    pub fn on_agents_changed(&self, change: &AgentsChanged) {
        if let AgentChangeCause::ScanCycle(_) = change.cause {
            self.record_cycle(&change.agents);
        }
    }

    /// Diff against the previous cycle, append events, and every Nth cycle a snapshot.
    /// Write failures are logged and swallowed.
    pub fn record_cycle(&self, agents: &[AgentProcess]) -> CycleLog {
        let now = self.now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.cycles += 1;

        let today = now.date_naive();
        if state.retention_day != Some(today) {
            state.retention_day = Some(today);
            match self.log.enforce_retention(today) {
                Ok(report) => debug!(
                    expired = report.expired,
                    over_limit = report.over_limit,
                    "Log retention applied"
                ),
                Err(e) => warn!(error = %e, "Log retention failed"),
            }
        }

        let mut events = Vec::new();
        let mut current = HashMap::with_capacity(agents.len());

        for agent in agents {
            let start_time = match state.previous.get(&agent.pid) {
                None => {
                    info!(pid = agent.pid, label = %agent.label, "Agent process started");
                    events.push(ProcessLifecycleEvent::started(agent, now));
                    agent.start_time
                }
                // Same pid with a different start time is a reused pid
                Some(prev) if is_reused(prev.start_time, agent.start_time) => {
                    info!(pid = agent.pid, label = %agent.label, "Agent pid reused");
                    events.push(ProcessLifecycleEvent::ended(
                        agent.pid,
                        &prev.label,
                        prev.start_time,
                        prev.state,
                        now,
                    ));
                    events.push(ProcessLifecycleEvent::started(agent, now));
                    agent.start_time
                }
                Some(prev) => {
                    if prev.state != agent.state {
                        events.push(ProcessLifecycleEvent::state_changed(agent, prev.state, now));
                    }
                    prev.start_time.or(agent.start_time)
                }
            };
            current.insert(
                agent.pid,
                Seen {
                    label: agent.label.clone(),
                    start_time,
                    state: agent.state,
                },
            );
        }

        let mut ended: Vec<(&Pid, &Seen)> = state
            .previous
            .iter()
            .filter(|(pid, _)| !current.contains_key(pid))
            .collect();
        ended.sort_by_key(|(pid, _)| **pid);
        for (pid, seen) in ended {
            info!(pid = *pid, label = %seen.label, "Agent process ended");
            events.push(ProcessLifecycleEvent::ended(
                *pid,
                &seen.label,
                seen.start_time,
                seen.state,
                now,
            ));
        }

        state.previous = current;

        let mut written = CycleLog::default();
        if !events.is_empty() {
            match self.log.append_events(&events) {
                Ok(()) => written.events = events.len(),
                Err(e) => warn!(error = %e, count = events.len(), "Failed to write lifecycle events"),
            }
        }

        if state.cycles % self.snapshot_every == 0 && !agents.is_empty() {
            let snapshots: Vec<ProcessSnapshot> = agents
                .iter()
                .map(|agent| ProcessSnapshot::from_agent(agent, now))
                .collect();
            match self.log.append_snapshots(&snapshots) {
                Ok(()) => written.snapshots = snapshots.len(),
                Err(e) => warn!(error = %e, count = snapshots.len(), "Failed to write snapshots"),
            }
        }

        written
    }

    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.time_provider.now_millis())
            .single()
            .unwrap_or_else(Utc::now)
    }

    pub fn cycles(&self) -> u64 {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).cycles
    }
}

fn is_reused(previous: Option<i64>, current: Option<i64>) -> bool {
    matches!((previous, current), (Some(a), Some(b)) if a != b)
}
