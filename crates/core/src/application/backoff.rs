// Per-entity exponential backoff for failing scans

use tracing::debug;

/// Backoff policy: `base`, doubling on every consecutive failure, capped.
/// No jitter, so the delay sequence is non-decreasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base_ms: u64,
    cap_ms: u64,
}

impl BackoffPolicy {
    pub fn new(base_ms: u64, cap_ms: u64) -> Self {
        Self {
            base_ms,
            cap_ms: cap_ms.max(base_ms),
        }
    }

    /// Delay after `consecutive_failures` failures in a row (0 -> no delay)
    pub fn delay_ms(&self, consecutive_failures: u32) -> u64 {
        if consecutive_failures == 0 {
            return 0;
        }
        let shift = (consecutive_failures - 1).min(63);
        let factor = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
        self.base_ms.saturating_mul(factor).min(self.cap_ms)
    }
}

/// Backoff state owned by one repository's scan schedule
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackoffState {
    consecutive_failures: u32,
    current_delay_ms: u64,
}

impl BackoffState {
    /// Record a failure; returns the new delay in ms
    pub fn record_failure(&mut self, policy: &BackoffPolicy) -> u64 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.current_delay_ms = policy.delay_ms(self.consecutive_failures);
        debug!(
            failures = self.consecutive_failures,
            delay_ms = self.current_delay_ms,
            "Backoff increased"
        );
        self.current_delay_ms
    }

    /// Record a success; delay resets to zero
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
        self.current_delay_ms = 0;
    }

    pub fn current_delay_ms(&self) -> u64 {
        self.current_delay_ms
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
