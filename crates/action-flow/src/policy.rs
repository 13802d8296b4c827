//! Retry policy and per-category retry decisions

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classifier::FailureCategory;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per step, first try included
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    /// Generated candidates added per ElementNotFound retry
    pub widen_step: usize,
    /// Per-step timeout growth applied on Timeout
    pub timeout_growth: f64,
    /// Backoff multiplier used for NetworkError
    pub network_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            widen_step: 3,
            timeout_growth: 1.5,
            network_multiplier: 3.0,
        }
    }
}

impl RetryPolicy {
    /// `min(base * multiplier^(attempt-1), max)` for a 1-based attempt.
    pub fn backoff(&self, attempt: u32, multiplier: f64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let raw = self.base_delay_ms as f64 * multiplier.max(1.0).powi(exponent);
        let capped = if raw.is_finite() {
            raw.min(self.max_delay_ms as f64)
        } else {
            self.max_delay_ms as f64
        };
        Duration::from_millis(capped.max(0.0) as u64)
    }
}

/// Changes applied to the step before it is re-run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjustments {
    pub widen_selectors: usize,
    pub timeout_multiplier: f64,
    pub wait_for_network_idle: bool,
}

impl Default for Adjustments {
    fn default() -> Self {
        Self {
            widen_selectors: 0,
            timeout_multiplier: 1.0,
            wait_for_network_idle: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryDecision {
    pub should_retry: bool,
    #[serde(with = "duration_ms")]
    pub delay: Duration,
    pub adjustments: Adjustments,
}

impl RetryDecision {
    pub fn stop() -> Self {
        Self {
            should_retry: false,
            delay: Duration::ZERO,
            adjustments: Adjustments::default(),
        }
    }
}

/// Decide whether the step that just failed on `attempt` (1-based) is re-run.
pub fn decide(category: FailureCategory, attempt: u32, policy: &RetryPolicy) -> RetryDecision {
    if category == FailureCategory::CancellationRequested || attempt >= policy.max_attempts {
        return RetryDecision::stop();
    }

    let mut adjustments = Adjustments::default();
    let mut multiplier = policy.multiplier;
    match category {
        FailureCategory::ElementNotFound => adjustments.widen_selectors = policy.widen_step,
        FailureCategory::Timeout => adjustments.timeout_multiplier = policy.timeout_growth,
        FailureCategory::NetworkError => multiplier = policy.network_multiplier,
        FailureCategory::ElementNotActionable => adjustments.wait_for_network_idle = true,
        FailureCategory::Generic | FailureCategory::CancellationRequested => {}
    }

    RetryDecision {
        should_retry: true,
        delay: policy.backoff(attempt, multiplier),
        adjustments,
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_retry_waits_base_delay() {
        let policy = RetryPolicy::default();
        let decision = decide(FailureCategory::Generic, 1, &policy);
        assert!(decision.should_retry);
        assert_eq!(decision.delay, Duration::from_millis(1_000));
        assert_eq!(decide(FailureCategory::Generic, 2, &policy).delay.as_millis(), 2_000);
    }

    #[test]
    fn delay_is_monotonic_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 50,
            ..RetryPolicy::default()
        };
        let mut previous = Duration::ZERO;
        for attempt in 1..50 {
            let delay = policy.backoff(attempt, policy.multiplier);
            assert!(delay >= previous);
            assert!(delay <= Duration::from_millis(policy.max_delay_ms));
            previous = delay;
        }
        assert_eq!(previous, Duration::from_millis(30_000));
    }

    #[test]
    fn stops_at_max_attempts() {
        let policy = RetryPolicy::default();
        assert!(decide(FailureCategory::Timeout, 2, &policy).should_retry);
        assert!(!decide(FailureCategory::Timeout, 3, &policy).should_retry);
        assert!(!decide(FailureCategory::Timeout, 7, &policy).should_retry);
    }

    #[test]
    fn cancellation_is_never_retried() {
        let decision = decide(FailureCategory::CancellationRequested, 1, &RetryPolicy::default());
        assert_eq!(decision, RetryDecision::stop());
    }

    #[test]
    fn category_adjustments() {
        let policy = RetryPolicy::default();

        let not_found = decide(FailureCategory::ElementNotFound, 1, &policy);
        assert_eq!(not_found.adjustments.widen_selectors, 3);
        assert_eq!(not_found.delay, Duration::from_millis(1_000));

        let timeout = decide(FailureCategory::Timeout, 1, &policy);
        assert_eq!(timeout.adjustments.timeout_multiplier, 1.5);

        let network = decide(FailureCategory::NetworkError, 2, &policy);
        assert_eq!(network.delay, Duration::from_millis(3_000));

        let blocked = decide(FailureCategory::ElementNotActionable, 1, &policy);
        assert!(blocked.adjustments.wait_for_network_idle);
        assert_eq!(blocked.adjustments.widen_selectors, 0);
    }

    #[test]
    fn widen_step_is_tunable() {
        let policy = RetryPolicy {
            widen_step: 1,
            ..RetryPolicy::default()
        };
        assert_eq!(
            decide(FailureCategory::ElementNotFound, 1, &policy)
                .adjustments
                .widen_selectors,
            1
        );
    }
}
