// Application Layer - Scanners, Store and Logger

pub mod backoff;
pub mod constants;
pub mod panic_guard;
pub mod process_logger;
pub mod process_scanner;
pub mod repo_scanner;
pub mod runtime;
pub mod shutdown;
pub mod store;

// Re-exports
pub use backoff::{BackoffPolicy, BackoffState};
pub use process_logger::ProcessLogger;
pub use process_scanner::{ProcessScanOutput, ProcessScanner};
pub use repo_scanner::{RepoScanSnapshot, RepoScanner, ScanCycleReport};
pub use runtime::{Monitor, MonitorHandle};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use store::{AgentChangeCause, AgentsChanged, DataStore, RepoView};
