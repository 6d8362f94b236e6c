//! Bounded retry schedule shared by the fetcher (per request) and the
//! orchestrator (per target).
//!
//! The two budgets are separate [`RetryPolicy`] values; each call site walks
//! its own [`RetryState`], so exhausting one never consumes the other.

use std::time::Duration;

use pronos_core::ScrapingConfig;

/// Backoff delay before retry `n` (1-based) is `base_delay * 2^(n-1)`,
/// capped at `max_delay`, optionally scaled by ±25 % jitter and capped again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` disables retrying.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            jitter: false,
        }
    }

    #[must_use]
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Policy for the fetcher's intra-call retries.
    #[must_use]
    pub fn for_requests(config: &ScrapingConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_max_ms),
        )
        .with_jitter()
    }

    /// Policy for whole-target retries within one run.
    #[must_use]
    pub fn for_targets(config: &ScrapingConfig) -> Self {
        Self::new(
            config.target_retry_budget,
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_max_ms),
        )
    }

    /// Deterministic delay before retry number `retry` (1-based).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(20);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    #[must_use]
    pub fn start(&self) -> RetryState {
        RetryState {
            policy: *self,
            attempts: 0,
        }
    }
}

/// One walk through a [`RetryPolicy`].
///
/// Call [`begin_attempt`](Self::begin_attempt) before each try. After a
/// retryable failure, [`next_backoff`](Self::next_backoff) yields the wait
/// before the next try, or `None` once the budget is spent.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempts: u32,
}

impl RetryState {
    /// Records the start of an attempt and returns its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// `true` once `1 + max_retries` attempts have started.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.attempts > self.policy.max_retries
    }

    /// Delay before the next attempt, or `None` when no retries remain.
    #[must_use]
    pub fn next_backoff(&self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        let delay = self.policy.backoff(self.attempts);
        if !self.policy.jitter {
            return Some(delay);
        }
        let factor = rand::random::<f64>() * 0.5 + 0.75;
        Some(delay.mul_f64(factor).min(self.policy.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_retries,
            Duration::from_millis(1_000),
            Duration::from_millis(5_000),
        )
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = policy(10);
        assert_eq!(p.backoff(1), Duration::from_millis(1_000));
        assert_eq!(p.backoff(2), Duration::from_millis(2_000));
        assert_eq!(p.backoff(3), Duration::from_millis(4_000));
        assert_eq!(p.backoff(4), Duration::from_millis(5_000));
        assert_eq!(p.backoff(30), Duration::from_millis(5_000));
    }

    #[test]
    fn three_retries_allow_four_attempts() {
        let mut state = policy(3).start();
        let mut delays = Vec::new();
        loop {
            state.begin_attempt();
            match state.next_backoff() {
                Some(delay) => delays.push(delay),
                None => break,
            }
        }
        assert_eq!(state.attempts(), 4);
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(1_000),
                Duration::from_millis(2_000),
                Duration::from_millis(4_000),
            ]
        );
    }

    #[test]
    fn zero_retries_is_a_single_attempt() {
        let mut state = policy(0).start();
        assert_eq!(state.begin_attempt(), 1);
        assert!(state.is_exhausted());
        assert!(state.next_backoff().is_none());
    }

    #[test]
    fn jitter_stays_within_cap() {
        let p = policy(5).with_jitter();
        let mut state = p.start();
        for _ in 0..5 {
            state.begin_attempt();
            let delay = state.next_backoff().unwrap();
            assert!(delay <= Duration::from_millis(5_000));
            assert!(delay >= Duration::from_millis(750));
        }
    }

    #[test]
    fn independent_states_do_not_share_budget() {
        let p = policy(1);
        let mut a = p.start();
        let mut b = p.start();
        a.begin_attempt();
        a.begin_attempt();
        assert!(a.is_exhausted());
        b.begin_attempt();
        assert!(!b.is_exhausted());
    }
}
