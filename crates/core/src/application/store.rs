// DataStore - copy-on-write aggregate of scanner output and wrapper overrides
//
// Every write builds a new value and swaps the Arc held by a watch channel.
// Readers clone the current Arc and never see a map mutated after publish.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use crate::application::panic_guard::execute_guarded;
use crate::application::process_scanner::ProcessScanOutput;
use crate::application::repo_scanner::RepoScanSnapshot;
use crate::domain::{AgentProcess, DiscoveryError, Pid, RepoStatus, SandboxFlags, WrapperState};
use crate::port::TimeProvider;

/// Repository side of the store
#[derive(Debug, Clone, Default)]
pub struct RepoView {
    pub generation: u64,
    pub repos: BTreeMap<String, RepoStatus>,
    pub discovery_errors: Vec<DiscoveryError>,
    pub ignored_count: usize,
}

/// Process side of the store, as published by the scanner
#[derive(Debug, Clone, Default)]
struct AgentView {
    cycle: u64,
    agents: BTreeMap<Pid, AgentProcess>,
    ports: HashMap<u16, Pid>,
}

/// Externally pushed per-pid overrides
#[derive(Debug, Clone, Default)]
struct Overlay {
    wrappers: BTreeMap<Pid, WrapperState>,
    sandbox: BTreeMap<Pid, SandboxFlags>,
}

/// What triggered an agents-changed notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentChangeCause {
    /// A process scan cycle was published
    ScanCycle(u64),
    /// A wrapper state was pushed, removed or expired
    WrapperUpdate,
    /// Sandbox flags were set or cleared
    SandboxUpdate,
}

/// Payload for agents-changed subscribers
#[derive(Debug, Clone)]
pub struct AgentsChanged {
    pub cause: AgentChangeCause,
    pub agents: Arc<Vec<AgentProcess>>,
}

pub type RepoSubscriber = Arc<dyn Fn(&RepoView) + Send + Sync>;
pub type AgentSubscriber = Arc<dyn Fn(&AgentsChanged) + Send + Sync>;

/// Single-writer, multi-reader aggregator
pub struct DataStore {
    time_provider: Arc<dyn TimeProvider>,
    wrapper_ttl_ms: i64,

    repos: watch::Sender<Arc<RepoView>>,
    agents: watch::Sender<Arc<AgentView>>,
    overlay: watch::Sender<Arc<Overlay>>,
    repo_index: watch::Sender<Arc<BTreeMap<Pid, String>>>,

    // Serializes read-modify-write publishes; readers never take it
    writer: Mutex<()>,

    repo_subscribers: Mutex<Vec<RepoSubscriber>>,
    agent_subscribers: Mutex<Vec<AgentSubscriber>>,
}

fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DataStore {
    pub fn new(time_provider: Arc<dyn TimeProvider>, wrapper_ttl: Duration) -> Self {
        Self {
            time_provider,
            wrapper_ttl_ms: wrapper_ttl.as_millis() as i64,
            repos: watch::Sender::new(Arc::default()),
            agents: watch::Sender::new(Arc::default()),
            overlay: watch::Sender::new(Arc::default()),
            repo_index: watch::Sender::new(Arc::default()),
            writer: Mutex::new(()),
            repo_subscribers: Mutex::new(Vec::new()),
            agent_subscribers: Mutex::new(Vec::new()),
        }
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Register a repos-changed callback. A panicking callback is logged and skipped.
    pub fn on_repos_changed<F>(&self, callback: F)
    where
        F: Fn(&RepoView) + Send + Sync + 'static,
    {
        relock(&self.repo_subscribers).push(Arc::new(callback));
    }

    /// Register an agents-changed callback. A panicking callback is logged and skipped.
    pub fn on_agents_changed<F>(&self, callback: F)
    where
        F: Fn(&AgentsChanged) + Send + Sync + 'static,
    {
        relock(&self.agent_subscribers).push(Arc::new(callback));
    }

    fn notify_repos(&self, view: &RepoView) {
        let subscribers = relock(&self.repo_subscribers).clone();
        for subscriber in subscribers {
            execute_guarded("repos_changed", || subscriber(view));
        }
    }

    fn notify_agents(&self, cause: AgentChangeCause) {
        let subscribers = relock(&self.agent_subscribers).clone();
        if subscribers.is_empty() {
            return;
        }
        let change = AgentsChanged {
            cause,
            agents: Arc::new(self.snapshot_agents()),
        };
        for subscriber in subscribers {
            execute_guarded("agents_changed", || subscriber(&change));
        }
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    /// Replace the repository map. A snapshot older than the published one is
    /// dropped and false is returned.
    pub fn publish_repos(&self, snapshot: RepoScanSnapshot) -> bool {
        let view = Arc::new(RepoView {
            generation: snapshot.generation,
            repos: snapshot.repos,
            discovery_errors: snapshot.discovery_errors,
            ignored_count: snapshot.ignored_count,
        });
        {
            let _writer = relock(&self.writer);
            let published = self.repos.borrow().generation;
            if view.generation < published {
                debug!(
                    generation = view.generation,
                    published, "Dropped stale repository snapshot"
                );
                return false;
            }
            self.repos.send_replace(Arc::clone(&view));
            self.rebuild_repo_index();
        }
        debug!(repos = view.repos.len(), "Published repositories");
        self.notify_repos(&view);
        true
    }

    /// Replace the agent map and port index; prunes expired wrapper states
    pub fn publish_agents(&self, output: ProcessScanOutput) {
        let cycle = output.cycle;
        {
            let _writer = relock(&self.writer);
            self.agents.send_replace(Arc::new(AgentView {
                cycle: output.cycle,
                agents: output.agents,
                ports: output.ports,
            }));
            self.prune_expired_locked();
            self.rebuild_repo_index();
        }
        debug!(cycle, "Published agents");
        self.notify_agents(AgentChangeCause::ScanCycle(cycle));
    }

    /// Insert or replace the wrapper state for its pid, stamping the receipt time
    pub fn upsert_wrapper_state(&self, mut state: WrapperState) {
        state.received_at = self.time_provider.now_millis();
        let pid = state.pid;
        {
            let _writer = relock(&self.writer);
            let mut overlay = (**self.overlay.borrow()).clone();
            overlay.wrappers.insert(pid, state);
            self.overlay.send_replace(Arc::new(overlay));
            self.rebuild_repo_index();
        }
        debug!(pid, "Wrapper state updated");
        self.notify_agents(AgentChangeCause::WrapperUpdate);
    }

    /// Remove the wrapper state for `pid`; returns false if none was stored
    pub fn remove_wrapper_state(&self, pid: Pid) -> bool {
        let removed = {
            let _writer = relock(&self.writer);
            let mut overlay = (**self.overlay.borrow()).clone();
            let removed = overlay.wrappers.remove(&pid).is_some();
            if removed {
                self.overlay.send_replace(Arc::new(overlay));
                self.rebuild_repo_index();
            }
            removed
        };
        if removed {
            self.notify_agents(AgentChangeCause::WrapperUpdate);
        }
        removed
    }

    pub fn set_sandbox_flags(&self, pid: Pid, flags: SandboxFlags) {
        {
            let _writer = relock(&self.writer);
            let mut overlay = (**self.overlay.borrow()).clone();
            overlay.sandbox.insert(pid, flags);
            self.overlay.send_replace(Arc::new(overlay));
        }
        self.notify_agents(AgentChangeCause::SandboxUpdate);
    }

    pub fn clear_sandbox_flags(&self, pid: Pid) -> bool {
        let removed = {
            let _writer = relock(&self.writer);
            let mut overlay = (**self.overlay.borrow()).clone();
            let removed = overlay.sandbox.remove(&pid).is_some();
            if removed {
                self.overlay.send_replace(Arc::new(overlay));
            }
            removed
        };
        if removed {
            self.notify_agents(AgentChangeCause::SandboxUpdate);
        }
        removed
    }

    /// Drop expired wrapper states; returns how many were removed
    pub fn prune_expired_wrappers(&self) -> usize {
        let pruned = {
            let _writer = relock(&self.writer);
            let pruned = self.prune_expired_locked();
            if pruned > 0 {
                self.rebuild_repo_index();
            }
            pruned
        };
        if pruned > 0 {
            self.notify_agents(AgentChangeCause::WrapperUpdate);
        }
        pruned
    }

    // Caller holds the writer lock
    fn prune_expired_locked(&self) -> usize {
        let now = self.time_provider.now_millis();
        let current = self.overlay.borrow().clone();
        let expired = current
            .wrappers
            .values()
            .filter(|w| !w.is_fresh(now, self.wrapper_ttl_ms))
            .count();
        if expired == 0 {
            return 0;
        }

        let mut overlay = (*current).clone();
        overlay.wrappers.retain(|_, w| w.is_fresh(now, self.wrapper_ttl_ms));
        self.overlay.send_replace(Arc::new(overlay));
        debug!(expired, "Pruned expired wrapper states");
        expired
    }

    // Caller holds the writer lock
    fn rebuild_repo_index(&self) {
        let repos = self.repos.borrow().clone();
        let agents = self.agents.borrow().clone();
        let overlay = self.overlay.borrow().clone();

        let mut index = BTreeMap::new();
        for agent in agents.agents.values() {
            if let Some(repo) = agent.cwd.as_deref().and_then(|cwd| owning_repo(&repos.repos, cwd)) {
                index.insert(agent.pid, repo);
            }
        }
        for wrapper in overlay.wrappers.values() {
            if index.contains_key(&wrapper.pid) {
                continue;
            }
            if let Some(repo) = wrapper.cwd.as_deref().and_then(|cwd| owning_repo(&repos.repos, cwd)) {
                index.insert(wrapper.pid, repo);
            }
        }
        self.repo_index.send_replace(Arc::new(index));
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    /// Repositories sorted by path
    pub fn snapshot_repos(&self) -> Vec<RepoStatus> {
        self.repos.borrow().repos.values().cloned().collect()
    }

    pub fn discovery_errors(&self) -> Vec<DiscoveryError> {
        self.repos.borrow().discovery_errors.clone()
    }

    pub fn ignored_count(&self) -> usize {
        self.repos.borrow().ignored_count
    }

    /// Agents sorted by pid, with fresh wrapper state, sandbox flags and repo path merged.
    /// Fresh wrapper states for pids the scanner has not seen appear as wrapper-only agents.
    pub fn snapshot_agents(&self) -> Vec<AgentProcess> {
        let now = self.time_provider.now_millis();
        let agents = self.agents.borrow().clone();
        let overlay = self.overlay.borrow().clone();
        let index = self.repo_index.borrow().clone();

        let mut merged: BTreeMap<Pid, AgentProcess> = agents.agents.clone();
        for wrapper in overlay.wrappers.values() {
            if !wrapper.is_fresh(now, self.wrapper_ttl_ms) {
                continue;
            }
            merged
                .entry(wrapper.pid)
                .and_modify(|agent| agent.merge_wrapper(wrapper))
                .or_insert_with(|| AgentProcess::from_wrapper(wrapper));
        }

        merged
            .into_values()
            .map(|mut agent| {
                agent.repo_path = index.get(&agent.pid).cloned();
                agent.sandbox = overlay.sandbox.get(&agent.pid).cloned();
                agent
            })
            .collect()
    }

    /// Unexpired wrapper states sorted by pid
    pub fn snapshot_wrapper_states(&self) -> Vec<WrapperState> {
        let now = self.time_provider.now_millis();
        self.overlay
            .borrow()
            .wrappers
            .values()
            .filter(|w| w.is_fresh(now, self.wrapper_ttl_ms))
            .cloned()
            .collect()
    }

    /// pid -> owning repository path
    pub fn agent_repo_index(&self) -> Arc<BTreeMap<Pid, String>> {
        self.repo_index.borrow().clone()
    }

    /// listening port -> pid
    pub fn port_index(&self) -> HashMap<u16, Pid> {
        self.agents.borrow().ports.clone()
    }

    /// Last published process scan cycle
    pub fn agent_cycle(&self) -> u64 {
        self.agents.borrow().cycle
    }
}

/// Longest repository path that is an ancestor of (or equal to) `cwd`
fn owning_repo(repos: &BTreeMap<String, RepoStatus>, cwd: &str) -> Option<String> {
    let cwd = Path::new(cwd);
    repos
        .keys()
        .filter(|repo| cwd.starts_with(Path::new(repo.as_str())))
        .max_by_key(|repo| repo.len())
        .cloned()
}
