//! Exponential backoff retry policy (spec.md §4.A "Retry policy").

use std::time::Duration;

/// Configuration for exponential backoff with an optional cap on attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub max_attempts: u32,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_mins(1),
            backoff_factor: 2.0,
            max_attempts: 15,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// `delay = min(base · factor^attempts, maxDelay)`, with an optional uniform
    /// jitter in `[0, delay]` applied on top for thundering-herd avoidance.
    #[must_use]
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let factor = self.backoff_factor.powi(attempts as i32);
        let scaled = self.base_delay.as_secs_f64() * factor;
        let capped = scaled.min(self.max_delay.as_secs_f64()).max(0.0);
        let base = Duration::from_secs_f64(capped);
        if self.jitter {
            let jitter_frac: f64 = rand::random::<f64>();
            Duration::from_secs_f64(capped * jitter_frac).min(base)
        } else {
            base
        }
    }

    /// Whether an item at `attempts` retries has exhausted its retry budget.
    #[must_use]
    pub const fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_then_caps() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            max_attempts: 10,
            jitter: false,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        // 100ms * 2^10 = 102.4s, capped at 5s
        assert_eq!(policy.delay_for(10), Duration::from_secs(5));
    }

    #[test]
    fn retry_bound_is_respected() {
        let policy = RetryPolicy { max_attempts: 3, ..RetryPolicy::default() };
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));
        assert!(policy.exhausted(4));
    }
}
