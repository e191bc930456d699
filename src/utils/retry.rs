// src/utils/retry.rs
use rand::Rng;
use std::time::Duration;

/// Exponential backoff with additive jitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows failed attempt `attempt` (1-based),
    /// without jitter: base * 2^(attempt-1), capped at `max_delay`.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as u32;
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// `backoff` plus uniform jitter in [0, backoff / 2].
    pub fn backoff_with_jitter<R: Rng + ?Sized>(&self, attempt: usize, rng: &mut R) -> Duration {
        let delay = self.backoff(attempt);
        let jitter_cap = delay.as_millis() as u64 / 2;
        let jitter = if jitter_cap > 0 {
            rng.gen_range(0..=jitter_cap)
        } else {
            0
        };
        delay + Duration::from_millis(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(5), Duration::from_millis(1000));
        assert_eq!(policy.backoff(60), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_stays_within_half_delay() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(3);
        for attempt in 1..6 {
            let base = policy.backoff(attempt);
            let jittered = policy.backoff_with_jitter(attempt, &mut rng);
            assert!(jittered >= base);
            assert!(jittered <= base + base / 2);
        }
    }
}
