// ProcessScanner - signature matching, heuristic state, cwd resolution

mod classify;
mod cwd_cache;

pub use classify::{classify, Sample, Thresholds};
pub use cwd_cache::CwdCache;

use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::config::ProcessScanConfig;
use crate::domain::{AgentProcess, Pid, SignatureSet};
use crate::port::{ProbeError, ProcessProbe, ProcessRow, TimeProvider};

/// Output of one process scan, published to the store as a whole
#[derive(Debug, Clone, Default)]
pub struct ProcessScanOutput {
    pub cycle: u64,
    pub agents: BTreeMap<Pid, AgentProcess>,
    pub ports: HashMap<u16, Pid>,
}

/// Per-pid observation history
#[derive(Debug, Clone, Copy)]
struct PidTracker {
    first_seen_at: i64,
    start_time: Option<i64>,
    last_active_at: Option<i64>,
}

struct ScanState {
    cycle: u64,
    trackers: HashMap<Pid, PidTracker>,
    cwd_cache: CwdCache,
}

/// Maintains pid -> AgentProcess for matched processes
pub struct ProcessScanner {
    signatures: SignatureSet,
    thresholds: Thresholds,
    probe: Arc<dyn ProcessProbe>,
    time_provider: Arc<dyn TimeProvider>,
    state: Mutex<ScanState>,
}

impl ProcessScanner {
    pub fn new(
        config: &ProcessScanConfig,
        signatures: SignatureSet,
        probe: Arc<dyn ProcessProbe>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        let cwd_ttl_ms = i64::try_from(config.cwd_cache_ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        Self {
            signatures,
            thresholds: Thresholds::from(config),
            probe,
            time_provider,
            state: Mutex::new(ScanState {
                cycle: 0,
                trackers: HashMap::new(),
                cwd_cache: CwdCache::new(cwd_ttl_ms),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScanState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one scan cycle
    ///
    /// # Errors
    /// - ProbeError if the process table cannot be read (trackers are left untouched)
    pub async fn scan(&self) -> Result<ProcessScanOutput, ProbeError> {
        let rows = self.probe.list_processes().await?;
        let now = self.time_provider.now_millis();

        let matched: Vec<(ProcessRow, String)> = rows
            .into_iter()
            .filter_map(|row| {
                let label = self
                    .signatures
                    .match_label(&row.exe_path, &row.command_line)?
                    .to_string();
                Some((row, label))
            })
            .collect();

        let cwds = self.resolve_cwds(&matched, now).await;

        let mut agents = BTreeMap::new();
        let cycle = {
            let mut state = self.lock();
            state.cycle += 1;

            let mut trackers = HashMap::with_capacity(matched.len());
            for (row, label) in matched {
                let tracker = self.track(state.trackers.get(&row.pid), &row, now);
                let cwd = cwds.get(&row.pid).cloned().flatten();
                let agent = self.build_agent(row, label, &tracker, cwd, now);
                trackers.insert(agent.pid, tracker);
                agents.insert(agent.pid, agent);
            }
            // Pids absent this cycle are forgotten; a reappearance starts fresh
            state.trackers = trackers;
            state.cycle
        };

        let pids: Vec<Pid> = agents.keys().copied().collect();
        let ports = if pids.is_empty() {
            HashMap::new()
        } else {
            self.probe.listening_ports(&pids).await
        };

        debug!(cycle, agents = agents.len(), ports = ports.len(), "Process scan complete");
        Ok(ProcessScanOutput { cycle, agents, ports })
    }

    async fn resolve_cwds(&self, matched: &[(ProcessRow, String)], now: i64) -> HashMap<Pid, Option<String>> {
        let mut resolved = HashMap::with_capacity(matched.len());
        let misses: Vec<Pid> = {
            let mut state = self.lock();
            state.cwd_cache.evict_expired(now);
            matched
                .iter()
                .filter_map(|(row, _)| match state.cwd_cache.get(row.pid, now) {
                    Some(cwd) => {
                        resolved.insert(row.pid, cwd);
                        None
                    }
                    None => Some(row.pid),
                })
                .collect()
        };

        if misses.is_empty() {
            return resolved;
        }

        let lookups = join_all(misses.into_iter().map(|pid| async move {
            (pid, self.probe.resolve_cwd(pid).await)
        }))
        .await;

        let mut state = self.lock();
        for (pid, cwd) in lookups {
            state.cwd_cache.insert(pid, cwd.clone(), now);
            resolved.insert(pid, cwd);
        }
        resolved
    }

    fn track(&self, previous: Option<&PidTracker>, row: &ProcessRow, now: i64) -> PidTracker {
        let mut tracker = match previous {
            // Same pid with a different start time is a reused pid
            Some(prev) if prev.start_time == row.start_time => *prev,
            _ => PidTracker {
                first_seen_at: now,
                start_time: row.start_time,
                last_active_at: None,
            },
        };

        if row.cpu_percent.is_some_and(|cpu| cpu > 0.0) {
            tracker.last_active_at = Some(now);
        }
        tracker
    }

    fn build_agent(
        &self,
        row: ProcessRow,
        label: String,
        tracker: &PidTracker,
        cwd: Option<String>,
        now: i64,
    ) -> AgentProcess {
        let quiet_ms = (now - tracker.last_active_at.unwrap_or(tracker.first_seen_at)).max(0);
        let heuristic = classify(
            &Sample {
                now,
                first_seen_at: tracker.first_seen_at,
                start_time: row.start_time,
                cpu_percent: row.cpu_percent,
                quiet_ms,
            },
            &self.thresholds,
        );

        AgentProcess {
            pid: row.pid,
            label,
            command_line: row.command_line,
            exe_path: row.exe_path,
            start_time: row.start_time,
            cpu_percent: row.cpu_percent,
            rss_kb: row.rss_kb,
            threads: row.threads,
            tty: row.tty,
            cwd,
            repo_path: None,
            heuristic_state: heuristic,
            quiet_seconds: (quiet_ms / 1000) as u64,
            first_seen_at: tracker.first_seen_at,
            wrapper_state: None,
            sandbox: None,
            state: heuristic,
            awaiting_user: false,
        }
    }

    /// Completed scan cycles
    pub fn cycle(&self) -> u64 {
        self.lock().cycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActivityState, MatcherKind, SignatureSpec};
    use crate::port::process_probe::mocks::MockProcessProbe;
    use crate::port::time_provider::mocks::ManualClock;

    const T0: i64 = 1_700_000_000_000;

    fn config() -> ProcessScanConfig {
        ProcessScanConfig {
            active_cpu_threshold: 1.0,
            stalled_secs: 30,
            startup_grace_secs: 5,
            min_elapsed_for_stalled_secs: 10,
            cwd_cache_ttl_secs: 10,
            ..Default::default()
        }
    }

    fn setup() -> (ProcessScanner, Arc<MockProcessProbe>, Arc<ManualClock>) {
        let probe = Arc::new(MockProcessProbe::new());
        let clock = Arc::new(ManualClock::new(T0));
        let signatures = SignatureSet::compile(&[
            SignatureSpec::new(MatcherKind::Regex, r"claude-code", "claude"),
            SignatureSpec::new(MatcherKind::ExePrefix, "codex", "codex"),
        ])
        .unwrap();
        let scanner = ProcessScanner::new(&config(), signatures, probe.clone(), clock.clone());
        (scanner, probe, clock)
    }

    fn row(pid: Pid, cmd: &str, cpu: f32, start: i64) -> ProcessRow {
        let mut row = ProcessRow::new(pid, cmd);
        row.cpu_percent = Some(cpu);
        row.start_time = Some(start);
        row
    }

    #[tokio::test]
    async fn test_only_matched_processes_tracked() {
        let (scanner, probe, _) = setup();
        probe.set_rows(vec![
            row(1, "node /usr/lib/claude-code/cli.js", 0.0, T0),
            row(2, "/usr/bin/bash -l", 0.0, T0),
            row(3, "/opt/codex --full-auto", 0.0, T0),
        ]);

        let out = scanner.scan().await.unwrap();
        assert_eq!(out.agents.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(out.agents[&1].label, "claude");
        assert_eq!(out.agents[&3].label, "codex");
        assert_eq!(out.cycle, 1);
    }

    #[tokio::test]
    async fn test_working_then_stalled() {
        let (scanner, probe, clock) = setup();
        let start = T0 - 120_000;

        probe.set_rows(vec![row(10, "codex", 8.0, start)]);
        let out = scanner.scan().await.unwrap();
        assert_eq!(out.agents[&10].heuristic_state, ActivityState::Working);
        assert_eq!(out.agents[&10].state, ActivityState::Working);

        clock.advance_secs(5);
        scanner.scan().await.unwrap();

        // Last non-zero CPU at T0+5s; 40s after T0 the process has been quiet 35s
        probe.set_rows(vec![row(10, "codex", 0.0, start)]);
        clock.advance_secs(35);
        let out = scanner.scan().await.unwrap();
        let agent = &out.agents[&10];
        assert_eq!(agent.quiet_seconds, 35);
        assert_eq!(agent.heuristic_state, ActivityState::Stalled);
    }

    #[tokio::test]
    async fn test_fresh_process_never_stalled_in_grace() {
        let (scanner, probe, clock) = setup();
        // Long-running process first seen now, never had CPU
        probe.set_rows(vec![row(11, "codex", 0.0, T0 - 3_600_000)]);

        for _ in 0..4 {
            let out = scanner.scan().await.unwrap();
            assert_eq!(out.agents[&11].heuristic_state, ActivityState::Waiting);
            clock.advance_secs(1);
        }
    }

    #[tokio::test]
    async fn test_pid_reuse_resets_tracking() {
        let (scanner, probe, clock) = setup();
        probe.set_rows(vec![row(12, "codex", 0.0, T0 - 600_000)]);
        scanner.scan().await.unwrap();

        clock.advance_secs(60);
        probe.set_rows(vec![row(12, "codex", 0.0, T0 + 59_000)]);
        let out = scanner.scan().await.unwrap();
        assert_eq!(out.agents[&12].first_seen_at, T0 + 60_000);
        assert_ne!(out.agents[&12].heuristic_state, ActivityState::Stalled);
    }

    #[tokio::test]
    async fn test_cwd_cached_until_expiry() {
        let (scanner, probe, clock) = setup();
        probe.set_rows(vec![row(20, "codex", 0.0, T0)]);
        probe.set_cwd(20, "/ws/a");

        let out = scanner.scan().await.unwrap();
        assert_eq!(out.agents[&20].cwd.as_deref(), Some("/ws/a"));
        assert_eq!(probe.cwd_call_count(), 1);

        clock.advance_secs(9);
        probe.set_cwd(20, "/ws/b");
        let out = scanner.scan().await.unwrap();
        assert_eq!(out.agents[&20].cwd.as_deref(), Some("/ws/a"), "served from cache");
        assert_eq!(probe.cwd_call_count(), 1);

        clock.advance_secs(1);
        let out = scanner.scan().await.unwrap();
        assert_eq!(out.agents[&20].cwd.as_deref(), Some("/ws/b"));
        assert_eq!(probe.cwd_call_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_cpu_is_unknown() {
        let (scanner, probe, _) = setup();
        let mut r = row(30, "codex", 0.0, T0);
        r.cpu_percent = None;
        probe.set_rows(vec![r]);

        let out = scanner.scan().await.unwrap();
        assert_eq!(out.agents[&30].heuristic_state, ActivityState::Unknown);
    }

    #[tokio::test]
    async fn test_ports_for_agents_only() {
        let (scanner, probe, _) = setup();
        probe.set_rows(vec![row(40, "codex", 0.0, T0), row(41, "nginx", 0.0, T0)]);
        probe.set_port(3000, 40);
        probe.set_port(80, 41);

        let out = scanner.scan().await.unwrap();
        assert_eq!(out.ports.len(), 1);
        assert_eq!(out.ports.get(&3000), Some(&40));
    }

    #[tokio::test]
    async fn test_probe_failure_is_error() {
        let (scanner, probe, _) = setup();
        probe.set_failing(true);
        assert!(scanner.scan().await.is_err());
        assert_eq!(scanner.cycle(), 0);
    }
}
