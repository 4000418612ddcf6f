// Process table probe
// reason: sysinfo for the cross-platform table, /proc for per-pid details on Linux
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
#[cfg(not(target_os = "linux"))]
use std::time::Duration;
use sysinfo::{ProcessRefreshKind, System, UpdateKind};
use tracing::{debug, warn};

use agentwatch_core::domain::Pid;
use agentwatch_core::port::{ProbeError, ProcessProbe, ProcessRow};

/// Budget for the `lsof` cwd fallback on non-Linux platforms
#[cfg(not(target_os = "linux"))]
const LSOF_TIMEOUT: Duration = Duration::from_secs(2);

struct ProbeState {
    system: System,
    // CPU usage needs two refreshes; the first sample is reported as unavailable
    primed: bool,
}

/// ProcessProbe backed by sysinfo
pub struct SysinfoProcessProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl SysinfoProcessProbe {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ProbeState {
                system: System::new(),
                primed: false,
            })),
        }
    }
}

impl Default for SysinfoProcessProbe {
    fn default() -> Self {
        Self::new()
    }
}

fn refresh_kind() -> ProcessRefreshKind {
    ProcessRefreshKind::new()
        .with_cpu()
        .with_memory()
        .with_cmd(UpdateKind::OnlyIfNotSet)
}

fn collect_rows(state: &mut ProbeState) -> Vec<ProcessRow> {
    state.system.refresh_processes_specifics(refresh_kind());
    let cpu_ready = state.primed;
    state.primed = true;

    state
        .system
        .processes()
        .iter()
        .map(|(pid, process)| {
            let cmd = process.cmd();
            let command_line = if cmd.is_empty() {
                process.name().to_string()
            } else {
                cmd.join(" ")
            };
            let exe_path = cmd
                .first()
                .cloned()
                .unwrap_or_else(|| process.name().to_string());

            let mut row = ProcessRow {
                pid: pid.as_u32(),
                command_line,
                exe_path,
                cpu_percent: cpu_ready.then(|| process.cpu_usage()),
                rss_kb: Some(process.memory() / 1024),
                threads: None,
                tty: None,
                start_time: i64::try_from(process.start_time())
                    .ok()
                    .filter(|secs| *secs > 0)
                    .map(|secs| secs * 1000),
            };
            fill_proc_details(&mut row);
            row
        })
        .collect()
}

#[cfg(target_os = "linux")]
fn fill_proc_details(row: &mut ProcessRow) {
    use crate::procfs::{decode_tty, linux};
    if let Some(stat) = linux::read_stat(row.pid) {
        row.threads = Some(stat.num_threads);
        row.tty = decode_tty(stat.tty_nr);
    }
}

#[cfg(not(target_os = "linux"))]
fn fill_proc_details(_row: &mut ProcessRow) {}

#[async_trait]
impl ProcessProbe for SysinfoProcessProbe {
    async fn list_processes(&self) -> Result<Vec<ProcessRow>, ProbeError> {
        let state = Arc::clone(&self.state);
        let rows = tokio::task::spawn_blocking(move || {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            collect_rows(&mut state)
        })
        .await
        .map_err(|e| ProbeError::Failed(format!("process table refresh: {}", e)))?;

        debug!(processes = rows.len(), "Process table refreshed");
        Ok(rows)
    }

    async fn resolve_cwd(&self, pid: Pid) -> Option<String> {
        #[cfg(target_os = "linux")]
        {
            tokio::task::spawn_blocking(move || crate::procfs::linux::read_cwd(pid))
                .await
                .ok()
                .flatten()
                .map(|p| p.to_string_lossy().into_owned())
        }

        #[cfg(not(target_os = "linux"))]
        {
            lsof_cwd(pid).await
        }
    }

    async fn listening_ports(&self, pids: &[Pid]) -> HashMap<u16, Pid> {
        #[cfg(target_os = "linux")]
        {
            let pids = pids.to_vec();
            match tokio::task::spawn_blocking(move || crate::procfs::linux::listening_ports(&pids)).await {
                Ok(ports) => ports,
                Err(e) => {
                    warn!(error = %e, "Listening port lookup failed");
                    HashMap::new()
                }
            }
        }

        #[cfg(not(target_os = "linux"))]
        {
            let _ = pids;
            HashMap::new()
        }
    }
}

/// `lsof -a -p PID -d cwd -Fn` prints the cwd on a line starting with `n`
#[cfg(not(target_os = "linux"))]
async fn lsof_cwd(pid: Pid) -> Option<String> {
    use tokio::process::Command;

    let child = Command::new("lsof")
        .args(["-a", "-p", &pid.to_string(), "-d", "cwd", "-Fn"])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .ok()?;

    let output = match tokio::time::timeout(LSOF_TIMEOUT, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(_)) => return None,
        Err(_) => {
            warn!(pid, "lsof cwd lookup timed out");
            return None;
        }
    };

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .find_map(|line| line.strip_prefix('n'))
        .map(str::to_string)
}
