// Process Probe Port
// Enumerates OS processes and per-process metrics

use async_trait::async_trait;
use std::collections::HashMap;

use super::ProbeError;
use crate::domain::Pid;

/// Raw process row as reported by the OS process table
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRow {
    pub pid: Pid,
    pub command_line: String,
    pub exe_path: String,
    pub cpu_percent: Option<f32>, // None if the sample is unavailable
    pub rss_kb: Option<u64>,
    pub threads: Option<u32>,
    pub tty: Option<String>,
    pub start_time: Option<i64>, // epoch ms
}

impl ProcessRow {
    pub fn new(pid: Pid, command_line: impl Into<String>) -> Self {
        let command_line = command_line.into();
        let exe_path = command_line
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            pid,
            command_line,
            exe_path,
            cpu_percent: Some(0.0),
            rss_kb: None,
            threads: None,
            tty: None,
            start_time: None,
        }
    }
}

/// Process probe trait
///
/// Implementations:
/// - SysinfoProcessProbe: sysinfo process table plus /proc lookups
/// - MockProcessProbe: in-memory rows for tests
#[async_trait]
pub trait ProcessProbe: Send + Sync {
    /// Enumerate all processes with current metrics
    async fn list_processes(&self) -> Result<Vec<ProcessRow>, ProbeError>;

    /// Resolve a process's working directory (may be expensive; callers cache)
    async fn resolve_cwd(&self, pid: Pid) -> Option<String>;

    /// Listening TCP ports owned by the given pids (port -> pid)
    async fn listening_ports(&self, _pids: &[Pid]) -> HashMap<u16, Pid> {
        HashMap::new()
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Mock ProcessProbe for testing
    #[derive(Default)]
    pub struct MockProcessProbe {
        rows: Mutex<Vec<ProcessRow>>,
        cwds: Mutex<HashMap<Pid, String>>,
        ports: Mutex<HashMap<u16, Pid>>,
        failing: Mutex<bool>,
        cwd_calls: Mutex<usize>,
    }

    impl MockProcessProbe {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_rows(&self, rows: Vec<ProcessRow>) {
            *self.rows.lock().unwrap() = rows;
        }

        pub fn set_cwd(&self, pid: Pid, cwd: impl Into<String>) {
            self.cwds.lock().unwrap().insert(pid, cwd.into());
        }

        pub fn set_port(&self, port: u16, pid: Pid) {
            self.ports.lock().unwrap().insert(port, pid);
        }

        pub fn set_failing(&self, failing: bool) {
            *self.failing.lock().unwrap() = failing;
        }

        pub fn cwd_call_count(&self) -> usize {
            *self.cwd_calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ProcessProbe for MockProcessProbe {
        async fn list_processes(&self) -> Result<Vec<ProcessRow>, ProbeError> {
            if *self.failing.lock().unwrap() {
                return Err(ProbeError::Failed("process table unavailable".to_string()));
            }
            Ok(self.rows.lock().unwrap().clone())
        }

        async fn resolve_cwd(&self, pid: Pid) -> Option<String> {
            *self.cwd_calls.lock().unwrap() += 1;
            self.cwds.lock().unwrap().get(&pid).cloned()
        }

        async fn listening_ports(&self, pids: &[Pid]) -> HashMap<u16, Pid> {
            self.ports
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, pid)| pids.contains(pid))
                .map(|(port, pid)| (*port, *pid))
                .collect()
        }
    }
}
