// Monitor constants (no magic values)
use std::time::Duration;

// ---------------------------------------------------------------------------
// Repository scanning
// ---------------------------------------------------------------------------

/// Rescan interval while a repository is dirty or in a special state (2s)
pub const DEFAULT_FAST_REFRESH_SECS: u64 = 2;

/// Rescan interval while a repository is clean (30s)
pub const DEFAULT_SLOW_REFRESH_SECS: u64 = 30;

/// Interval between discovery walks of the root directories (5 minutes)
pub const DEFAULT_DISCOVERY_INTERVAL_SECS: u64 = 300;

/// Tick at which due repositories are picked up for rescan (500ms)
pub const DEFAULT_RESCAN_TICK_MS: u64 = 500;

/// Timeout for cheap git calls: status, rev-parse (800ms)
pub const DEFAULT_GIT_FAST_TIMEOUT_MS: u64 = 800;

/// Timeout for expensive git calls: rev-list ahead/behind (5s)
pub const DEFAULT_GIT_SLOW_TIMEOUT_MS: u64 = 5000;

/// Max concurrent git subprocesses across all repositories
pub const DEFAULT_MAX_GIT_CONCURRENCY: usize = 4;

/// First backoff delay after a failed scan (1s)
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1000;

/// Upper bound for the backoff delay (5 minutes)
pub const DEFAULT_BACKOFF_CAP_MS: u64 = 5 * 60 * 1000;

/// Directory names never descended into during discovery
pub const DEFAULT_IGNORE_DIRS: &[&str] = &[
    "node_modules",
    "target",
    "vendor",
    "dist",
    "build",
    "__pycache__",
    "venv",
    "Library",
];

/// Max directory depth below each root during discovery
pub const DEFAULT_DISCOVERY_MAX_DEPTH: usize = 6;

// ---------------------------------------------------------------------------
// Process scanning
// ---------------------------------------------------------------------------

/// Process table scan interval (1s)
pub const DEFAULT_PROCESS_SCAN_INTERVAL_MS: u64 = 1000;

/// CPU percent at or above which an agent is WORKING
pub const DEFAULT_ACTIVE_CPU_THRESHOLD: f32 = 1.0;

/// Quiet seconds at or above which an agent is STALLED
pub const DEFAULT_STALLED_SECS: u64 = 30;

/// Startup grace since first observation, never STALLED inside it (5s)
pub const DEFAULT_STARTUP_GRACE_SECS: u64 = 5;

/// Minimum process age before STALLED is possible (10s)
pub const DEFAULT_MIN_ELAPSED_FOR_STALLED_SECS: u64 = 10;

/// Per-pid cwd cache lifetime (10s)
pub const DEFAULT_CWD_CACHE_TTL_SECS: u64 = 10;

/// Wrapper state lifetime, measured from receipt (30s)
pub const DEFAULT_WRAPPER_TTL_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Process logging
// ---------------------------------------------------------------------------

/// Directory name under the data dir when no log dir is configured
pub const DEFAULT_LOG_DIR_NAME: &str = "process-logs";

/// Snapshot every Nth scan cycle
pub const DEFAULT_SNAPSHOT_EVERY_N_CYCLES: u64 = 30;

/// Files older than this are deleted on rotation
pub const DEFAULT_LOG_MAX_AGE_DAYS: u32 = 30;

/// Max files kept per record kind after the age pass
pub const DEFAULT_LOG_MAX_FILES: usize = 60;

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// Grace given to each scan loop to exit after a stop signal (5s)
pub const LOOP_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
