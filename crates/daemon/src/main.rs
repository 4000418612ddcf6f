//! Agentwatch - Monitor Daemon Entry Point
//! Watches git repositories and coding-agent processes, logs agent activity as JSONL

mod logging;
mod settings;

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use agentwatch_core::application::{AgentChangeCause, Monitor, ProcessLogger};
use agentwatch_core::port::time_provider::SystemTimeProvider;
use agentwatch_infra_jsonl::JsonlActivityLog;
use agentwatch_infra_system::{GitCliProbe, SysinfoProcessProbe};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging; the guard flushes the file writer on exit
    let _log_guard = logging::init()?;

    info!("Agentwatch v{} starting...", VERSION);

    // 2. Load and validate configuration
    let config = settings::load()?;
    let signatures = config.validate().context("Invalid configuration")?;

    if config.repos.roots.is_empty() {
        warn!("No repository roots configured; only agent processes will be watched");
    }
    info!(
        roots = ?config.repos.roots,
        signatures = signatures.len(),
        max_git_concurrency = config.repos.max_git_concurrency,
        "Configuration loaded"
    );

    // 3. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let git = Arc::new(GitCliProbe::new(config.repos.max_git_concurrency));
    let processes = Arc::new(SysinfoProcessProbe::new());

    let monitor = Monitor::new(&config, signatures, git, processes, time_provider.clone());
    let store = monitor.store();

    // 4. Activity log (optional)
    if config.logger.enabled {
        let log_dir = config
            .logger
            .log_dir
            .clone()
            .context("Log directory not resolved")?;
        info!(log_dir = %log_dir.display(), "Activity logging enabled");

        let activity_log = Arc::new(JsonlActivityLog::new(
            log_dir,
            config.logger.max_age_days,
            config.logger.max_files,
        ));
        let logger = Arc::new(ProcessLogger::new(
            activity_log,
            time_provider.clone(),
            config.logger.snapshot_every_n_cycles,
        ));
        logger.attach(&store);
    }

    // 5. Summary logging
    store.on_repos_changed(|view| {
        let dirty = view.repos.values().filter(|r| r.needs_fast_refresh()).count();
        debug!(
            repos = view.repos.len(),
            dirty,
            discovery_errors = view.discovery_errors.len(),
            ignored = view.ignored_count,
            "Repositories updated"
        );
    });
    store.on_agents_changed(|change| {
        if let AgentChangeCause::ScanCycle(cycle) = change.cause {
            let mut by_state: BTreeMap<String, usize> = BTreeMap::new();
            for agent in change.agents.iter() {
                *by_state.entry(agent.state.to_string()).or_default() += 1;
            }
            debug!(cycle, agents = change.agents.len(), states = ?by_state, "Agents updated");
        }
    });

    // 6. Start loops
    let handle = monitor.start();

    info!("System ready. Watching...");
    info!("Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown
    handle.stop().await;

    info!("Shutdown complete.");

    Ok(())
}
