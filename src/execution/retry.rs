//! Bounded retry policy for step execution
//!
//! Retry behavior is a value consumed by the executor: maximum attempts,
//! exponential backoff, and a retryable predicate keyed off the error
//! taxonomy. Only transient failures are ever retried.

use crate::error::OrchestrationError;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            backoff_multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            backoff_multiplier: 1,
        }
    }

    /// Delay before the attempt following `completed_attempts` (1-based)
    pub fn backoff_for(&self, completed_attempts: u32) -> Duration {
        let exponent = completed_attempts.saturating_sub(1);
        self.initial_backoff * self.backoff_multiplier.saturating_pow(exponent)
    }

    /// Whether another attempt should follow this failure
    pub fn should_retry(&self, error: &OrchestrationError, completed_attempts: u32) -> bool {
        completed_attempts < self.max_attempts && error.is_transient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_exponentially() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(100),
            backoff_multiplier: 2,
        };

        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_only_transient_errors_retry() {
        let policy = RetryPolicy::default();

        let transient = OrchestrationError::Transient("timed out".into());
        assert!(policy.should_retry(&transient, 1));
        assert!(policy.should_retry(&transient, 2));
        assert!(!policy.should_retry(&transient, 3));

        let terminal = OrchestrationError::EntityNotFound("XYZ".into());
        assert!(!policy.should_retry(&terminal, 1));
    }
}
