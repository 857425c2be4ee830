//! Retry/backoff policy shared by the generation client and the orchestrator.
//!
//! One `Backoff` per failure kind. The delay before retry `n` (1-based) is
//! `max(retry_after_hint, min(base * factor^(n-1), cap))`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ServiceFailure;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backoff {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    pub base: Duration,
    pub factor: f64,
    pub cap: Duration,
}

impl Backoff {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base: Duration::from_secs(1),
            factor: 2.0,
            cap: Duration::from_secs(30),
        }
    }

    /// Delay before retry number `retry` (1 = first retry).
    pub fn delay(&self, retry: u32) -> Duration {
        let exp = self.factor.powi(retry.saturating_sub(1) as i32);
        let secs = (self.base.as_secs_f64() * exp).min(self.cap.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub rate_limit: Backoff,
    pub service: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limit: Backoff::new(5),
            service: Backoff::new(3),
        }
    }
}

impl RetryPolicy {
    /// How long to wait after `attempt` (1-based) failed with `failure`,
    /// or `None` when the failure is fatal or attempts are exhausted.
    pub fn next_delay(&self, failure: &ServiceFailure, attempt: u32) -> Option<Duration> {
        match failure {
            ServiceFailure::Fatal { .. } => None,
            ServiceFailure::RateLimited { retry_after } => {
                if attempt >= self.rate_limit.max_attempts {
                    return None;
                }
                let backoff = self.rate_limit.delay(attempt);
                Some(retry_after.map_or(backoff, |hint| hint.max(backoff)))
            }
            ServiceFailure::Transient { .. } => {
                if attempt >= self.service.max_attempts {
                    return None;
                }
                Some(self.service.delay(attempt))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let b = Backoff::new(10);
        assert_eq!(b.delay(1), Duration::from_secs(1));
        assert_eq!(b.delay(2), Duration::from_secs(2));
        assert_eq!(b.delay(3), Duration::from_secs(4));
        assert_eq!(b.delay(6), Duration::from_secs(30));
        assert_eq!(b.delay(20), Duration::from_secs(30));
    }

    #[test]
    fn test_retry_after_hint_wins_when_longer() {
        let policy = RetryPolicy::default();
        let failure = ServiceFailure::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(policy.next_delay(&failure, 1), Some(Duration::from_secs(7)));
        assert_eq!(policy.next_delay(&failure, 4), Some(Duration::from_secs(8)));
    }

    #[test]
    fn test_attempts_are_bounded_per_kind() {
        let policy = RetryPolicy::default();
        let limited = ServiceFailure::RateLimited { retry_after: None };
        let transient = ServiceFailure::Transient {
            message: "502".into(),
        };
        assert!(policy.next_delay(&limited, 4).is_some());
        assert!(policy.next_delay(&limited, 5).is_none());
        assert!(policy.next_delay(&transient, 2).is_some());
        assert!(policy.next_delay(&transient, 3).is_none());
    }

    #[test]
    fn test_fatal_is_never_retried() {
        let policy = RetryPolicy::default();
        let fatal = ServiceFailure::Fatal {
            status: Some(400),
            message: "bad prompt".into(),
        };
        assert!(policy.next_delay(&fatal, 1).is_none());
    }
}
