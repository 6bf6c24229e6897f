use crate::probe::{Liveness, Signal};
use tracing::{error, warn};

/// Decision returned by the retry policy after each probe during a
/// suspected outage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// A re-probe succeeded; the outage was a transient blip.
    Recovered { attempt: u32, signal: Signal },
    /// Probe failed; wait out the grace period and re-probe (1-based attempt).
    Retry { attempt: u32 },
    /// Every re-probe failed, so the outage is confirmed.
    Exhausted,
}

/// Grace/retry debouncing for proxy outages.
///
/// The first failed probe schedules re-probe 1; each further failure
/// schedules the next until `max_retries` re-probes have all failed.
pub struct RetryPolicy {
    max_retries: u32,
    current_attempt: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            current_attempt: 0,
        }
    }

    /// Evaluate the latest probe and decide what to do next.
    pub fn evaluate(&mut self, liveness: Liveness) -> RetryDecision {
        if let Liveness::Alive(signal) = liveness {
            return RetryDecision::Recovered {
                attempt: self.current_attempt,
                signal,
            };
        }

        self.current_attempt += 1;

        if self.current_attempt <= self.max_retries {
            warn!(
                attempt = self.current_attempt,
                max_retries = self.max_retries,
                "proxy probe failed, re-probing after grace period"
            );
            RetryDecision::Retry {
                attempt: self.current_attempt,
            }
        } else {
            error!(
                max_retries = self.max_retries,
                "proxy re-probes exhausted, outage confirmed"
            );
            RetryDecision::Exhausted
        }
    }

    /// Current attempt count (0 = no failure seen yet).
    #[allow(dead_code)]
    pub fn current_attempt(&self) -> u32 {
        self.current_attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_failure_schedules_first_retry() {
        let mut policy = RetryPolicy::new(2);
        assert_eq!(
            policy.evaluate(Liveness::Down),
            RetryDecision::Retry { attempt: 1 }
        );
        assert_eq!(policy.current_attempt(), 1);
    }

    #[test]
    fn test_exhausted_after_all_retries_fail() {
        let mut policy = RetryPolicy::new(2);
        // Initial failure
        assert_eq!(
            policy.evaluate(Liveness::Down),
            RetryDecision::Retry { attempt: 1 }
        );
        // Re-probe 1 fails
        assert_eq!(
            policy.evaluate(Liveness::Down),
            RetryDecision::Retry { attempt: 2 }
        );
        // Re-probe 2 fails, exhausted
        assert_eq!(policy.evaluate(Liveness::Down), RetryDecision::Exhausted);
    }

    #[test]
    fn test_recovery_reports_attempt_and_signal() {
        let mut policy = RetryPolicy::new(3);
        policy.evaluate(Liveness::Down);
        policy.evaluate(Liveness::Down);
        assert_eq!(
            policy.evaluate(Liveness::Alive(Signal::Process)),
            RetryDecision::Recovered {
                attempt: 2,
                signal: Signal::Process
            }
        );
    }

    #[test]
    fn test_recovery_does_not_consume_attempts() {
        let mut policy = RetryPolicy::new(2);
        policy.evaluate(Liveness::Down);
        policy.evaluate(Liveness::Alive(Signal::Socket));
        assert_eq!(policy.current_attempt(), 1);
    }

    #[test]
    fn test_single_retry_configuration() {
        let mut policy = RetryPolicy::new(1);
        assert_eq!(
            policy.evaluate(Liveness::Down),
            RetryDecision::Retry { attempt: 1 }
        );
        assert_eq!(policy.evaluate(Liveness::Down), RetryDecision::Exhausted);
    }

    #[test]
    fn test_zero_retries_exhausts_immediately() {
        let mut policy = RetryPolicy::new(0);
        assert_eq!(policy.evaluate(Liveness::Down), RetryDecision::Exhausted);
    }

    #[test]
    fn test_retry_count_matches_configuration() {
        for retries in 1..=5u32 {
            let mut policy = RetryPolicy::new(retries);
            let mut scheduled = 0;
            while let RetryDecision::Retry { .. } = policy.evaluate(Liveness::Down) {
                scheduled += 1;
            }
            assert_eq!(scheduled, retries);
        }
    }
}
