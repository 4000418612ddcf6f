// Activity Log Port
// Durable, append-only sink for process snapshots and lifecycle events

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::{ProcessLifecycleEvent, ProcessSnapshot};

/// Activity log errors
#[derive(Error, Debug)]
pub enum LogError {
    #[error("Write failed for {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Files removed by a retention pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub expired: usize,
    pub over_limit: usize,
}

/// Activity log trait
///
/// Single-writer: only the ProcessLogger appends.
pub trait ActivityLog: Send + Sync {
    /// Append snapshot records to the file for their UTC day
    fn append_snapshots(&self, records: &[ProcessSnapshot]) -> Result<(), LogError>;

    /// Append lifecycle events to the file for their UTC day
    fn append_events(&self, records: &[ProcessLifecycleEvent]) -> Result<(), LogError>;

    /// Delete files older than the max age, then the oldest beyond the max count
    fn enforce_retention(&self, today: NaiveDate) -> Result<RetentionReport, LogError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// In-memory activity log
    #[derive(Default)]
    pub struct MemoryActivityLog {
        snapshots: Mutex<Vec<ProcessSnapshot>>,
        events: Mutex<Vec<ProcessLifecycleEvent>>,
        retention_days: Mutex<Vec<NaiveDate>>,
        failing: Mutex<bool>,
    }

    impl MemoryActivityLog {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_failing(&self, failing: bool) {
            *self.failing.lock().unwrap() = failing;
        }

        pub fn snapshots(&self) -> Vec<ProcessSnapshot> {
            self.snapshots.lock().unwrap().clone()
        }

        pub fn events(&self) -> Vec<ProcessLifecycleEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn retention_runs(&self) -> Vec<NaiveDate> {
            self.retention_days.lock().unwrap().clone()
        }

        fn check(&self) -> Result<(), LogError> {
            if *self.failing.lock().unwrap() {
                return Err(LogError::Write {
                    path: "memory".to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                });
            }
            Ok(())
        }
    }

    impl ActivityLog for MemoryActivityLog {
        fn append_snapshots(&self, records: &[ProcessSnapshot]) -> Result<(), LogError> {
            self.check()?;
            self.snapshots.lock().unwrap().extend_from_slice(records);
            Ok(())
        }

        fn append_events(&self, records: &[ProcessLifecycleEvent]) -> Result<(), LogError> {
            self.check()?;
            self.events.lock().unwrap().extend_from_slice(records);
            Ok(())
        }

        fn enforce_retention(&self, today: NaiveDate) -> Result<RetentionReport, LogError> {
            self.retention_days.lock().unwrap().push(today);
            Ok(RetentionReport::default())
        }
    }
}
