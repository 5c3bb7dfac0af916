//! Reconnection policy and closure-code classification.

use std::time::Duration;

use crate::{BASE_RECONNECT_DELAY_MS, MAX_RECONNECT_ATTEMPTS, MAX_RECONNECT_DELAY_MS};

/// Closure code sent on a manual stop.
pub const MANUAL_CLOSE_CODE: u16 = 1000;

/// Closure code for an endpoint going away (tab close, server restart).
const GOING_AWAY_CODE: u16 = 1001;

/// Whether a closure code means the peer closed deliberately.
///
/// Only normal closures suppress reconnection; every other code (abnormal
/// closure, protocol error, policy violation, missing status) takes the
/// reconnect path.
pub fn is_normal_closure(code: u16) -> bool {
    matches!(code, MANUAL_CLOSE_CODE | GOING_AWAY_CODE)
}

/// Reconnection policy configuration.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Maximum number of reconnection attempts.
    pub max_attempts: u32,

    /// Base delay between attempts (exponential backoff applied).
    pub base_delay: Duration,

    /// Maximum delay between attempts.
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            base_delay: Duration::from_millis(BASE_RECONNECT_DELAY_MS),
            max_delay: Duration::from_millis(MAX_RECONNECT_DELAY_MS),
        }
    }
}

impl ReconnectPolicy {
    /// Calculate delay for a given attempt number (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 2u64.saturating_pow(attempt.saturating_sub(1));
        let delay = self
            .base_delay
            .saturating_mul(multiplier.min(u32::MAX as u64) as u32);
        delay.min(self.max_delay)
    }

    /// Check if attempt number `attempt` is within the budget.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = ReconnectPolicy::default();

        for n in 0..policy.max_attempts {
            let expected = Duration::from_millis((BASE_RECONNECT_DELAY_MS << n).min(MAX_RECONNECT_DELAY_MS));
            assert_eq!(policy.delay_for_attempt(n + 1), expected, "attempt {}", n + 1);
        }

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(6), Duration::from_secs(10));
    }

    #[test]
    fn test_retry_budget() {
        let policy = ReconnectPolicy::default();

        assert!(policy.should_retry(1));
        assert!(policy.should_retry(MAX_RECONNECT_ATTEMPTS));
        assert!(!policy.should_retry(MAX_RECONNECT_ATTEMPTS + 1));
    }

    #[test]
    fn test_closure_code_classification() {
        assert!(is_normal_closure(1000));
        assert!(is_normal_closure(1001));

        // Protocol error, abnormal closure, policy violation, no status.
        for code in [1002, 1006, 1008, 1005, 1011] {
            assert!(!is_normal_closure(code), "code {code}");
        }
    }
}
