use serde::{Deserialize, Serialize};

/// Timing and retry knobs the functional core plans with.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconcilePolicy {
    pub max_retries_per_phase: u32,
    pub backoff_base_secs: u64,
    pub backoff_cap_secs: u64,
    pub build_poll_secs: u64,
    pub pod_poll_secs: u64,
    pub log_timeout_secs: u64,
    pub pod_retention_secs: u64,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            max_retries_per_phase: 3,
            backoff_base_secs: 60,
            backoff_cap_secs: 300,
            build_poll_secs: 30,
            pod_poll_secs: 10,
            log_timeout_secs: 60,
            pod_retention_secs: 3600,
        }
    }
}

impl ReconcilePolicy {
    pub fn backoff_seconds(&self, attempt_number: u32) -> u64 {
        retry_backoff_seconds(self.backoff_base_secs, self.backoff_cap_secs, attempt_number)
    }
}

/// Pure exponential backoff: `base * 2^(n-1)`, capped.
///
/// Defaults give 1m, 2m, 4m, then 5m for every later attempt.
pub fn retry_backoff_seconds(base_secs: u64, cap_secs: u64, attempt_number: u32) -> u64 {
    let exp = attempt_number.saturating_sub(1).min(32);
    base_secs.saturating_mul(1u64 << exp).min(cap_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backoff_doubles_then_caps() {
        let p = ReconcilePolicy::default();
        assert_eq!(p.backoff_seconds(1), 60);
        assert_eq!(p.backoff_seconds(2), 120);
        assert_eq!(p.backoff_seconds(3), 240);
        assert_eq!(p.backoff_seconds(4), 300);
        assert_eq!(p.backoff_seconds(40), 300);
        assert_eq!(p.backoff_seconds(0), 60);
    }
}
