//! Retry and backoff policy for network join and main-loop recovery

/// How often and how patiently to retry a failing operation.
///
/// Attempts are counted from 1. `max_attempts: None` retries forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: u32,
}

impl RetryPolicy {
    /// Unattended field default: never give up, back off from 1 s to 30 s.
    pub const fn forever() -> Self {
        Self {
            max_attempts: None,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2,
        }
    }

    pub const fn bounded(max_attempts: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            initial_delay_ms,
            max_delay_ms,
            multiplier: 2,
        }
    }

    /// Whether attempt number `attempt` may run.
    pub fn allows(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt <= max,
            None => true,
        }
    }

    /// Delay to wait after failed attempt number `attempt`.
    pub fn delay_for(&self, attempt: u32) -> u64 {
        let mut delay = self.initial_delay_ms;
        for _ in 1..attempt {
            delay = delay.saturating_mul(self.multiplier as u64);
            if delay >= self.max_delay_ms {
                return self.max_delay_ms;
            }
        }
        delay.min(self.max_delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::forever()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        let policy = RetryPolicy::forever();
        assert_eq!(policy.delay_for(1), 1_000);
        assert_eq!(policy.delay_for(2), 2_000);
        assert_eq!(policy.delay_for(3), 4_000);
        assert_eq!(policy.delay_for(5), 16_000);
        assert_eq!(policy.delay_for(6), 30_000);
        assert_eq!(policy.delay_for(500), 30_000);
    }

    #[test]
    fn unbounded_policy_always_allows() {
        let policy = RetryPolicy::forever();
        assert!(policy.allows(1));
        assert!(policy.allows(u32::MAX));
    }

    #[test]
    fn bounded_policy_stops_after_max() {
        let policy = RetryPolicy::bounded(3, 10, 100);
        assert!(policy.allows(3));
        assert!(!policy.allows(4));
        assert_eq!(policy.delay_for(4), 80);
        assert_eq!(policy.delay_for(5), 100);
    }
}
