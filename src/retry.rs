use crate::config::RetryConfig;
use crate::error::ScrapeError;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Permanent,
}

/// What to do with a failed attempt.
#[derive(Debug)]
pub enum RetryDecision {
    Retry { delay: Duration },
    Fail(ScrapeError),
}

/// Bounded retry policy: exponential backoff with a cap, and a hard
/// attempt budget so every run reaches a terminal state.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    retry_parse_errors: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
            retry_parse_errors: config.retry_parse_errors,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Network-class failures are worth retrying; everything that needs
    /// a human (bad URL, delisted product, changed page layout) is not.
    /// Parse errors flip to transient only when configured per run.
    pub fn classify(&self, error: &ScrapeError) -> ErrorClass {
        match error {
            ScrapeError::Network(_) | ScrapeError::RateLimitTimeout { .. } => ErrorClass::Transient,
            ScrapeError::Parse(_) if self.retry_parse_errors => ErrorClass::Transient,
            ScrapeError::UnsupportedRetailer(_)
            | ScrapeError::Parse(_)
            | ScrapeError::NotFound(_)
            | ScrapeError::Storage(_)
            | ScrapeError::RetryBudgetExhausted { .. } => ErrorClass::Permanent,
        }
    }

    /// Backoff before the next attempt. `attempt` is the 1-based number
    /// of attempts already made.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let delay = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent as i32);
        Duration::from_secs_f64(delay).min(self.max_delay)
    }

    /// Map a failed attempt into a decision. Exhausting the budget wraps
    /// the last transient error so the terminal item records both.
    pub fn decide(&self, error: ScrapeError, attempt: u32) -> RetryDecision {
        match self.classify(&error) {
            ErrorClass::Permanent => RetryDecision::Fail(error),
            ErrorClass::Transient if attempt >= self.max_attempts => {
                RetryDecision::Fail(ScrapeError::RetryBudgetExhausted {
                    attempts: attempt,
                    last: Box::new(error),
                })
            }
            ErrorClass::Transient => RetryDecision::Retry {
                delay: self.next_delay(attempt),
            },
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::default()
    }

    #[test]
    fn network_errors_are_transient() {
        let p = policy();
        assert_eq!(
            p.classify(&ScrapeError::Network("timeout".into())),
            ErrorClass::Transient
        );
        assert_eq!(
            p.classify(&ScrapeError::RateLimitTimeout {
                retailer: "ozon".into(),
                waited_ms: 30_000,
            }),
            ErrorClass::Transient
        );
    }

    #[test]
    fn permanent_errors_never_retry() {
        let p = policy();
        for error in [
            ScrapeError::UnsupportedRetailer("https://x".into()),
            ScrapeError::Parse("layout changed".into()),
            ScrapeError::NotFound("https://x".into()),
        ] {
            assert_eq!(p.classify(&error), ErrorClass::Permanent);
            assert!(matches!(p.decide(error, 1), RetryDecision::Fail(_)));
        }
    }

    #[test]
    fn parse_errors_retry_when_configured() {
        let p = RetryPolicy::from_config(&RetryConfig {
            retry_parse_errors: true,
            ..RetryConfig::default()
        });
        assert_eq!(
            p.classify(&ScrapeError::Parse("flaky json".into())),
            ErrorClass::Transient
        );
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.next_delay(1), Duration::from_secs(2));
        assert_eq!(p.next_delay(2), Duration::from_secs(4));
        assert_eq!(p.next_delay(3), Duration::from_secs(8));
        assert_eq!(p.next_delay(10), Duration::from_secs(30));
    }

    #[test]
    fn budget_exhaustion_wraps_last_error() {
        let p = policy();
        let decision = p.decide(ScrapeError::Network("timeout".into()), 3);
        match decision {
            RetryDecision::Fail(ScrapeError::RetryBudgetExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last.kind(), "network_error");
            }
            other => panic!("expected exhausted budget, got {:?}", other),
        }
    }

    #[test]
    fn transient_below_budget_retries() {
        let p = policy();
        match p.decide(ScrapeError::Network("reset".into()), 1) {
            RetryDecision::Retry { delay } => assert_eq!(delay, Duration::from_secs(2)),
            other => panic!("expected retry, got {:?}", other),
        }
        match p.decide(ScrapeError::Network("reset".into()), 2) {
            RetryDecision::Retry { delay } => assert_eq!(delay, Duration::from_secs(4)),
            other => panic!("expected retry, got {:?}", other),
        }
    }
}
