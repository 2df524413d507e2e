use std::collections::{HashMap, HashSet};
use std::time::Duration;

use log::warn;
use rand::Rng;

use crate::cloud::endpoint::UploadError;
use crate::constants::{MAX_UPLOAD_ATTEMPTS, RETRY_BASE_DELAY_MS, RETRY_MAX_DELAY_SECS};
use crate::upload::error::PipelineError;

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per part, first attempt included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Randomize each delay within `[d/2, d]`
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_UPLOAD_ATTEMPTS,
            base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_secs(RETRY_MAX_DELAY_SECS),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay after `failures` failed attempts (1-based).
    pub fn base_backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Delay before the next attempt after `failures` failed attempts.
    pub fn backoff(&self, failures: u32) -> Duration {
        let delay = self.base_backoff(failures);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let max = delay.as_micros() as u64;
        let micros = rand::thread_rng().gen_range(max / 2..=max);
        Duration::from_micros(micros)
    }
}

/// Tracks failed parts and decides whether each gets another attempt.
///
/// A part is in the Failed set from the moment its failure is recorded until
/// a later attempt is acknowledged. While in the set its retry is in flight,
/// so it is never scheduled twice.
pub struct RetryEngine {
    policy: RetryPolicy,
    attempts: HashMap<u32, u32>,
    retry_in_flight: HashSet<u32>,
    total_retries: u64,
}

impl RetryEngine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: HashMap::new(),
            retry_in_flight: HashSet::new(),
            total_retries: 0,
        }
    }

    /// Record a failed attempt and return the delay before re-dispatching.
    ///
    /// Permanent errors and parts out of attempts are terminal; the caller
    /// must abort the session.
    pub fn on_failure(
        &mut self,
        part_number: u32,
        attempt: u32,
        cause: UploadError,
    ) -> Result<Duration, PipelineError> {
        let attempts = self.attempts.entry(part_number).or_insert(0);
        *attempts = (*attempts).max(attempt);
        let attempts = *attempts;

        if !cause.is_transient() {
            self.retry_in_flight.remove(&part_number);
            return Err(PipelineError::PermanentPartFailure {
                part_number,
                source: cause,
            });
        }

        if attempts >= self.policy.max_attempts {
            self.retry_in_flight.remove(&part_number);
            return Err(PipelineError::PartExhausted {
                part_number,
                attempts,
                source: cause,
            });
        }

        let delay = self.policy.backoff(attempts);
        warn!(
            "Part {} upload attempt {} failed, retrying in {:?}: {}",
            part_number, attempts, delay, cause
        );
        self.retry_in_flight.insert(part_number);
        self.total_retries += 1;
        Ok(delay)
    }

    /// A part was acknowledged; it leaves the Failed set for good.
    pub fn on_success(&mut self, part_number: u32) {
        self.retry_in_flight.remove(&part_number);
    }

    #[cfg(test)]
    fn is_retrying(&self, part_number: u32) -> bool {
        self.retry_in_flight.contains(&part_number)
    }

    /// True when no failed part is waiting on a retry
    pub fn is_drained(&self) -> bool {
        self.retry_in_flight.is_empty()
    }

    #[cfg(test)]
    fn attempts(&self, part_number: u32) -> u32 {
        self.attempts.get(&part_number).copied().unwrap_or(0)
    }

    pub fn total_retries(&self) -> u64 {
        self.total_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            jitter: false,
        }
    }

    #[test]
    fn test_exponential_backoff_calculation() {
        let policy = policy(5);
        assert_eq!(policy.backoff(1), Duration::from_millis(250));
        assert_eq!(policy.backoff(2), Duration::from_millis(500));
        assert_eq!(policy.backoff(3), Duration::from_millis(1000));
        assert_eq!(policy.backoff(4), Duration::from_millis(2000));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = policy(64);
        assert_eq!(policy.backoff(20), Duration::from_secs(30));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            jitter: true,
            ..policy(5)
        };
        for failures in 1..=4 {
            let ceiling = policy.base_backoff(failures);
            for _ in 0..50 {
                let delay = policy.backoff(failures);
                assert!(delay <= ceiling);
                assert!(delay >= ceiling / 2);
            }
        }
    }

    #[test]
    fn test_transient_failure_is_retried_until_exhausted() {
        let mut engine = RetryEngine::new(policy(3));
        let cause = UploadError::Transient("503 SlowDown".into());

        assert!(engine.on_failure(7, 1, cause.clone()).is_ok());
        assert!(engine.is_retrying(7));
        assert!(!engine.is_drained());
        assert!(engine.on_failure(7, 2, cause.clone()).is_ok());

        match engine.on_failure(7, 3, cause) {
            Err(PipelineError::PartExhausted { part_number, attempts, .. }) => {
                assert_eq!(part_number, 7);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(engine.total_retries(), 2);
    }

    #[test]
    fn test_permanent_failure_is_not_retried() {
        let mut engine = RetryEngine::new(policy(5));
        let result = engine.on_failure(2, 1, UploadError::Permanent("NoSuchUpload".into()));
        assert!(matches!(
            result,
            Err(PipelineError::PermanentPartFailure { part_number: 2, .. })
        ));
        assert!(engine.is_drained());
        assert_eq!(engine.total_retries(), 0);
    }

    #[test]
    fn test_success_drains_failed_set() {
        let mut engine = RetryEngine::new(policy(5));
        engine
            .on_failure(4, 1, UploadError::Transient("reset".into()))
            .unwrap();
        engine.on_success(4);
        assert!(engine.is_drained());
        assert_eq!(engine.attempts(4), 1);
    }
}
