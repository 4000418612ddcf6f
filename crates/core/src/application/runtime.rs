// Monitor runtime - independent periodic loops over the scanners

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::application::constants::LOOP_SHUTDOWN_GRACE;
use crate::application::process_scanner::ProcessScanner;
use crate::application::repo_scanner::RepoScanner;
use crate::application::shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
use crate::application::store::DataStore;
use crate::config::MonitorConfig;
use crate::domain::SignatureSet;
use crate::port::{GitProbe, ProcessProbe, TimeProvider};

/// Owns the store and both scanners; no process-wide state
#[derive(Clone)]
pub struct Monitor {
    store: Arc<DataStore>,
    repo_scanner: Arc<RepoScanner>,
    process_scanner: Arc<ProcessScanner>,
    process_interval: Duration,
    discovery_interval: Duration,
    rescan_tick: Duration,
}

impl Monitor {
    /// Wire scanners and a fresh store from configuration
    pub fn new(
        config: &MonitorConfig,
        signatures: SignatureSet,
        git: Arc<dyn GitProbe>,
        processes: Arc<dyn ProcessProbe>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        let store = Arc::new(DataStore::new(
            time_provider.clone(),
            Duration::from_secs(config.processes.wrapper_ttl_secs),
        ));
        let repo_scanner = Arc::new(RepoScanner::new(config.repos.clone(), git, time_provider.clone()));
        let process_scanner = Arc::new(ProcessScanner::new(
            &config.processes,
            signatures,
            processes,
            time_provider,
        ));

        Self {
            store,
            repo_scanner,
            process_scanner,
            process_interval: Duration::from_millis(config.processes.scan_interval_ms),
            discovery_interval: Duration::from_secs(config.repos.discovery_interval_secs),
            rescan_tick: Duration::from_millis(config.repos.rescan_tick_ms),
        }
    }

    pub fn store(&self) -> Arc<DataStore> {
        Arc::clone(&self.store)
    }

    pub fn repo_scanner(&self) -> Arc<RepoScanner> {
        Arc::clone(&self.repo_scanner)
    }

    pub fn process_scanner(&self) -> Arc<ProcessScanner> {
        Arc::clone(&self.process_scanner)
    }

    /// One process scan, published to the store. Returns false if the probe failed.
    pub async fn run_process_cycle(&self) -> bool {
        match self.process_scanner.scan().await {
            Ok(output) => {
                self.store.publish_agents(output);
                true
            }
            Err(e) => {
                warn!(error = %e, "Process scan failed");
                self.store.prune_expired_wrappers();
                false
            }
        }
    }

    /// One discovery pass, published to the store
    pub async fn run_discovery(&self) {
        self.repo_scanner.discover().await;
        self.store.publish_repos(self.repo_scanner.snapshot());
    }

    /// Rescan due repositories; publishes only when something was scanned
    pub async fn run_rescan_tick(&self) {
        let report = self.repo_scanner.scan_due().await;
        if report.scanned > 0 {
            debug!(
                scanned = report.scanned,
                failed = report.failed,
                changed = report.changed,
                "Rescan tick"
            );
            self.store.publish_repos(self.repo_scanner.snapshot());
        }
    }

    /// Spawn the process-scan, discovery and rescan loops
    pub fn start(&self) -> MonitorHandle {
        let (sender, token) = shutdown_channel();

        let process = {
            let monitor = self.clone();
            tokio::spawn(run_periodic("process_scan", self.process_interval, token.clone(), move || {
                let monitor = monitor.clone();
                async move {
                    monitor.run_process_cycle().await;
                }
            }))
        };

        let discovery = {
            let monitor = self.clone();
            tokio::spawn(run_periodic("discovery", self.discovery_interval, token.clone(), move || {
                let monitor = monitor.clone();
                async move { monitor.run_discovery().await }
            }))
        };

        let rescan = {
            let monitor = self.clone();
            tokio::spawn(run_periodic("rescan", self.rescan_tick, token, move || {
                let monitor = monitor.clone();
                async move { monitor.run_rescan_tick().await }
            }))
        };

        info!("Monitor started");
        MonitorHandle {
            sender,
            tasks: vec![("process_scan", process), ("discovery", discovery), ("rescan", rescan)],
        }
    }
}

/// Tick `body` every `period` until shutdown. The first tick fires immediately.
async fn run_periodic<F, Fut>(name: &'static str, period: Duration, mut shutdown: ShutdownToken, mut body: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(loop_name = name, period_ms = period.as_millis() as u64, "Loop started");

    loop {
        if shutdown.is_shutdown() {
            break;
        }
        tokio::select! {
            _ = interval.tick() => body().await,
            _ = shutdown.wait() => break,
        }
    }
    debug!(loop_name = name, "Loop stopped");
}

/// Handle to running loops
pub struct MonitorHandle {
    sender: ShutdownSender,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl MonitorHandle {
    /// Signal shutdown and wait for every loop, bounded by a grace timeout each
    pub async fn stop(self) {
        self.sender.shutdown();
        for (name, task) in self.tasks {
            match tokio::time::timeout(LOOP_SHUTDOWN_GRACE, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(loop_name = name, error = %e, "Loop task failed"),
                Err(_) => warn!(loop_name = name, "Loop did not stop within grace period"),
            }
        }
        info!("Monitor stopped");
    }
}
