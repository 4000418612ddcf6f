// Monitor Configuration
// Deserialized by the daemon from layered sources; every field has a default

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::application::constants::*;
use crate::domain::{DomainError, MatcherKind, SignatureSet, SignatureSpec};
use crate::error::{AppError, Result};

/// Top-level monitor configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub repos: RepoScanConfig,
    pub processes: ProcessScanConfig,
    pub logger: LoggerConfig,
}

/// Repository discovery and rescan settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoScanConfig {
    pub roots: Vec<PathBuf>,
    pub ignore_dirs: Vec<String>,
    pub max_depth: usize,
    pub fast_refresh_secs: u64,
    pub slow_refresh_secs: u64,
    pub discovery_interval_secs: u64,
    pub rescan_tick_ms: u64,
    pub git_fast_timeout_ms: u64,
    pub git_slow_timeout_ms: u64,
    pub max_git_concurrency: usize,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

impl Default for RepoScanConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            ignore_dirs: DEFAULT_IGNORE_DIRS.iter().map(|s| s.to_string()).collect(),
            max_depth: DEFAULT_DISCOVERY_MAX_DEPTH,
            fast_refresh_secs: DEFAULT_FAST_REFRESH_SECS,
            slow_refresh_secs: DEFAULT_SLOW_REFRESH_SECS,
            discovery_interval_secs: DEFAULT_DISCOVERY_INTERVAL_SECS,
            rescan_tick_ms: DEFAULT_RESCAN_TICK_MS,
            git_fast_timeout_ms: DEFAULT_GIT_FAST_TIMEOUT_MS,
            git_slow_timeout_ms: DEFAULT_GIT_SLOW_TIMEOUT_MS,
            max_git_concurrency: DEFAULT_MAX_GIT_CONCURRENCY,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_cap_ms: DEFAULT_BACKOFF_CAP_MS,
        }
    }
}

impl RepoScanConfig {
    pub fn fast_refresh(&self) -> Duration {
        Duration::from_secs(self.fast_refresh_secs)
    }

    pub fn slow_refresh(&self) -> Duration {
        Duration::from_secs(self.slow_refresh_secs)
    }

    pub fn git_fast_timeout(&self) -> Duration {
        Duration::from_millis(self.git_fast_timeout_ms)
    }

    pub fn git_slow_timeout(&self) -> Duration {
        Duration::from_millis(self.git_slow_timeout_ms)
    }
}

/// Process scan and classification settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessScanConfig {
    pub scan_interval_ms: u64,
    pub signatures: Vec<SignatureSpec>,
    pub active_cpu_threshold: f32,
    pub stalled_secs: u64,
    pub startup_grace_secs: u64,
    pub min_elapsed_for_stalled_secs: u64,
    pub cwd_cache_ttl_secs: u64,
    pub wrapper_ttl_secs: u64,
}

impl Default for ProcessScanConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: DEFAULT_PROCESS_SCAN_INTERVAL_MS,
            signatures: default_signatures(),
            active_cpu_threshold: DEFAULT_ACTIVE_CPU_THRESHOLD,
            stalled_secs: DEFAULT_STALLED_SECS,
            startup_grace_secs: DEFAULT_STARTUP_GRACE_SECS,
            min_elapsed_for_stalled_secs: DEFAULT_MIN_ELAPSED_FOR_STALLED_SECS,
            cwd_cache_ttl_secs: DEFAULT_CWD_CACHE_TTL_SECS,
            wrapper_ttl_secs: DEFAULT_WRAPPER_TTL_SECS,
        }
    }
}

/// Snapshot/event log settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub enabled: bool,
    /// None -> the daemon picks a directory under the platform data dir
    pub log_dir: Option<PathBuf>,
    pub snapshot_every_n_cycles: u64,
    pub max_age_days: u32,
    pub max_files: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_dir: None,
            snapshot_every_n_cycles: DEFAULT_SNAPSHOT_EVERY_N_CYCLES,
            max_age_days: DEFAULT_LOG_MAX_AGE_DAYS,
            max_files: DEFAULT_LOG_MAX_FILES,
        }
    }
}

/// Built-in agent signatures, most specific first
pub fn default_signatures() -> Vec<SignatureSpec> {
    vec![
        SignatureSpec::new(MatcherKind::Regex, r"@anthropic-ai/claude-code", "claude"),
        SignatureSpec::new(MatcherKind::ExePrefix, "claude", "claude"),
        SignatureSpec::new(MatcherKind::Regex, r"@openai/codex", "codex"),
        SignatureSpec::new(MatcherKind::ExePrefix, "codex", "codex"),
        SignatureSpec::new(MatcherKind::Regex, r"@google/gemini-cli", "gemini"),
        SignatureSpec::new(MatcherKind::ExePrefix, "gemini", "gemini"),
        SignatureSpec::new(MatcherKind::ExeSuffix, "cursor-agent", "cursor"),
        SignatureSpec::new(MatcherKind::Regex, r"(^|/)aider(\s|$)", "aider"),
    ]
}

impl MonitorConfig {
    /// Validate intervals and compile signatures
    ///
    /// # Errors
    /// - AppError::Config on zero intervals, zero concurrency, or fast > slow refresh
    /// - AppError::Domain if a signature does not compile
    pub fn validate(&self) -> Result<SignatureSet> {
        let repos = &self.repos;
        let checks: [(&str, u64); 10] = [
            ("repos.fast_refresh_secs", repos.fast_refresh_secs),
            ("repos.slow_refresh_secs", repos.slow_refresh_secs),
            ("repos.discovery_interval_secs", repos.discovery_interval_secs),
            ("repos.rescan_tick_ms", repos.rescan_tick_ms),
            ("repos.git_fast_timeout_ms", repos.git_fast_timeout_ms),
            ("repos.git_slow_timeout_ms", repos.git_slow_timeout_ms),
            ("repos.backoff_base_ms", repos.backoff_base_ms),
            ("repos.backoff_cap_ms", repos.backoff_cap_ms),
            ("processes.scan_interval_ms", self.processes.scan_interval_ms),
            ("logger.snapshot_every_n_cycles", self.logger.snapshot_every_n_cycles),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(AppError::Config(format!("{} must be greater than zero", name)));
            }
        }

        if repos.max_git_concurrency == 0 {
            return Err(AppError::Config(
                "repos.max_git_concurrency must be greater than zero".to_string(),
            ));
        }
        if repos.fast_refresh_secs > repos.slow_refresh_secs {
            return Err(AppError::Config(format!(
                "repos.fast_refresh_secs ({}) exceeds repos.slow_refresh_secs ({})",
                repos.fast_refresh_secs, repos.slow_refresh_secs
            )));
        }
        if !self.processes.active_cpu_threshold.is_finite() || self.processes.active_cpu_threshold < 0.0 {
            return Err(AppError::Config(
                "processes.active_cpu_threshold must be a non-negative number".to_string(),
            ));
        }
        if self.processes.signatures.is_empty() {
            return Err(DomainError::ValidationError("no agent signatures configured".to_string()).into());
        }

        Ok(SignatureSet::compile(&self.processes.signatures)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = MonitorConfig::default();
        let signatures = config.validate().unwrap();
        assert_eq!(signatures.len(), default_signatures().len());
    }

    #[test]
    fn test_rejects_zero_interval() {
        let mut config = MonitorConfig::default();
        config.processes.scan_interval_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("processes.scan_interval_ms"));
    }

    #[test]
    fn test_rejects_zero_backoff() {
        let mut config = MonitorConfig::default();
        config.repos.backoff_base_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("repos.backoff_base_ms"));

        let mut config = MonitorConfig::default();
        config.repos.backoff_cap_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_fast_slower_than_slow() {
        let mut config = MonitorConfig::default();
        config.repos.fast_refresh_secs = 60;
        config.repos.slow_refresh_secs = 30;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let mut config = MonitorConfig::default();
        config.repos.max_git_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_signature() {
        let mut config = MonitorConfig::default();
        config.processes.signatures = vec![SignatureSpec::new(MatcherKind::Regex, "[", "bad")];
        assert!(matches!(config.validate(), Err(AppError::Domain(_))));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: MonitorConfig =
            serde_json::from_str(r#"{"repos":{"roots":["/tmp/ws"],"fast_refresh_secs":1}}"#).unwrap();
        assert_eq!(config.repos.roots, vec![PathBuf::from("/tmp/ws")]);
        assert_eq!(config.repos.fast_refresh_secs, 1);
        assert_eq!(config.repos.slow_refresh_secs, DEFAULT_SLOW_REFRESH_SECS);
        assert!(config.logger.enabled);
    }
}
