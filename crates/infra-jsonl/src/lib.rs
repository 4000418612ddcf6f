// Agentwatch Infrastructure - JSONL Adapter
// Implements: ActivityLog (per-day append-only files, retention, read-back)

mod jsonl_log;

pub use jsonl_log::{JsonlActivityLog, LogFileInfo};
