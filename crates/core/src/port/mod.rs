// Port Layer - Interfaces for external dependencies

pub mod activity_log;
pub mod git_probe;
pub mod process_probe;
pub mod time_provider; // For deterministic testing

use thiserror::Error;

// Re-exports
pub use activity_log::{ActivityLog, LogError, RetentionReport};
pub use git_probe::GitProbe;
pub use process_probe::{ProcessProbe, ProcessRow};
pub use time_provider::TimeProvider;

/// Probe errors (subprocess or OS lookups)
///
/// Recovered at the scanner boundary; never raised to the store or its readers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Probe timed out after {budget_ms}ms")]
    Timeout { budget_ms: u64 },

    #[error("Probe failed: {0}")]
    Failed(String),

    #[error("Spawn failed: {0}")]
    Spawn(String),
}

impl ProbeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProbeError::Timeout { .. })
    }
}
