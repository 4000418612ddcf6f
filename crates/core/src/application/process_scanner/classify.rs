// Heuristic activity classification from CPU and quiescence

use crate::config::ProcessScanConfig;
use crate::domain::ActivityState;

/// Classification thresholds in ms / percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub active_cpu: f32,
    pub stalled_ms: i64,
    pub startup_grace_ms: i64,
    pub min_elapsed_for_stalled_ms: i64,
}

impl From<&ProcessScanConfig> for Thresholds {
    fn from(config: &ProcessScanConfig) -> Self {
        Self {
            active_cpu: config.active_cpu_threshold,
            stalled_ms: secs_to_ms(config.stalled_secs),
            startup_grace_ms: secs_to_ms(config.startup_grace_secs),
            min_elapsed_for_stalled_ms: secs_to_ms(config.min_elapsed_for_stalled_secs),
        }
    }
}

fn secs_to_ms(secs: u64) -> i64 {
    i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX)
}

/// Per-sample observation fed to the classifier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub now: i64,
    pub first_seen_at: i64,
    /// Process start; None falls back to first_seen_at
    pub start_time: Option<i64>,
    pub cpu_percent: Option<f32>,
    pub quiet_ms: i64,
}

/// Classify one sample.
///
/// Order: CPU unavailable -> UNKNOWN; CPU at or above threshold -> WORKING;
/// quiet at or above the stalled threshold -> STALLED unless inside the startup
/// grace or below the minimum elapsed floor; otherwise WAITING.
pub fn classify(sample: &Sample, thresholds: &Thresholds) -> ActivityState {
    let Some(cpu) = sample.cpu_percent else {
        return ActivityState::Unknown;
    };

    let in_grace = sample.now - sample.first_seen_at < thresholds.startup_grace_ms;
    let started = sample.start_time.unwrap_or(sample.first_seen_at);
    let below_min_elapsed = sample.now - started < thresholds.min_elapsed_for_stalled_ms;

    if cpu >= thresholds.active_cpu {
        return ActivityState::Working;
    }
    if !in_grace && !below_min_elapsed && sample.quiet_ms >= thresholds.stalled_ms {
        return ActivityState::Stalled;
    }
    ActivityState::Waiting
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_000_000_000;

    fn thresholds() -> Thresholds {
        Thresholds {
            active_cpu: 1.0,
            stalled_ms: 30_000,
            startup_grace_ms: 5_000,
            min_elapsed_for_stalled_ms: 10_000,
        }
    }

    fn sample(cpu: Option<f32>, age_ms: i64, seen_ms: i64, quiet_ms: i64) -> Sample {
        Sample {
            now: NOW,
            first_seen_at: NOW - seen_ms,
            start_time: Some(NOW - age_ms),
            cpu_percent: cpu,
            quiet_ms,
        }
    }

    #[test]
    fn test_busy_process_is_working() {
        let s = sample(Some(8.0), 120_000, 120_000, 0);
        assert_eq!(classify(&s, &thresholds()), ActivityState::Working);
    }

    #[test]
    fn test_quiet_process_is_stalled() {
        let s = sample(Some(0.0), 160_000, 160_000, 35_000);
        assert_eq!(classify(&s, &thresholds()), ActivityState::Stalled);
    }

    #[test]
    fn test_below_stalled_threshold_is_waiting() {
        let s = sample(Some(0.5), 160_000, 160_000, 29_999);
        assert_eq!(classify(&s, &thresholds()), ActivityState::Waiting);
    }

    #[test]
    fn test_cpu_threshold_is_inclusive() {
        let s = sample(Some(1.0), 160_000, 160_000, 90_000);
        assert_eq!(classify(&s, &thresholds()), ActivityState::Working);
    }

    #[test]
    fn test_stalled_threshold_is_inclusive() {
        let s = sample(Some(0.0), 160_000, 160_000, 30_000);
        assert_eq!(classify(&s, &thresholds()), ActivityState::Stalled);
    }

    #[test]
    fn test_never_stalled_within_grace() {
        // Process is old, but first observed 4.999s ago
        for quiet in [0, 30_000, 10_000_000] {
            let s = sample(Some(0.0), 3_600_000, 4_999, quiet);
            assert_ne!(classify(&s, &thresholds()), ActivityState::Stalled);
        }
        // Grace boundary: exactly 5s since first seen leaves the grace period
        let s = sample(Some(0.0), 3_600_000, 5_000, 10_000_000);
        assert_eq!(classify(&s, &thresholds()), ActivityState::Stalled);
    }

    #[test]
    fn test_never_stalled_below_min_elapsed() {
        let s = sample(Some(0.0), 9_999, 9_999, 10_000_000);
        assert_eq!(classify(&s, &thresholds()), ActivityState::Waiting);

        let s = sample(Some(0.0), 10_000, 9_999, 10_000_000);
        assert_eq!(classify(&s, &thresholds()), ActivityState::Stalled);
    }

    #[test]
    fn test_unknown_start_falls_back_to_first_seen() {
        let mut s = sample(Some(0.0), 0, 8_000, 60_000);
        s.start_time = None;
        assert_eq!(classify(&s, &thresholds()), ActivityState::Waiting);

        s.first_seen_at = NOW - 10_000;
        assert_eq!(classify(&s, &thresholds()), ActivityState::Stalled);
    }

    #[test]
    fn test_working_allowed_within_grace() {
        let s = sample(Some(50.0), 100, 100, 0);
        assert_eq!(classify(&s, &thresholds()), ActivityState::Working);
    }

    #[test]
    fn test_missing_cpu_is_unknown() {
        let s = sample(None, 120_000, 120_000, 60_000);
        assert_eq!(classify(&s, &thresholds()), ActivityState::Unknown);
    }
}
