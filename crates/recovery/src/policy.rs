//! Retry policy with exponential backoff.
//!
//! ```
//! use recovery::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(1), 2.0, false)
//!     .unwrap();
//!
//! assert_eq!(policy.base_delay(0), Duration::from_millis(100));
//! assert_eq!(policy.base_delay(1), Duration::from_millis(200));
//! assert_eq!(policy.base_delay(10), Duration::from_secs(1));
//! ```

use gate_core::RetrySettings;
use rand::Rng;
use std::time::Duration;
use thiserror::Error;

/// Fraction of the delay that jitter may add or remove.
const JITTER_FRACTION: f64 = 0.1;

/// Rejected retry policy parameters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    #[error("max delay {max_delay:?} is shorter than initial delay {initial_delay:?}")]
    DelayBounds {
        initial_delay: Duration,
        max_delay: Duration,
    },

    #[error("backoff multiplier must be finite and greater than 1, got {0}")]
    Multiplier(f64),
}

/// Immutable retry schedule.
///
/// An operation run under this policy is tried once and then retried up to
/// `max_attempts` more times.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
    jitter: bool,
}

impl RetryPolicy {
    /// Create a validated policy.
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
        jitter: bool,
    ) -> Result<Self, PolicyError> {
        if max_delay < initial_delay {
            return Err(PolicyError::DelayBounds {
                initial_delay,
                max_delay,
            });
        }
        if !backoff_multiplier.is_finite() || backoff_multiplier <= 1.0 {
            return Err(PolicyError::Multiplier(backoff_multiplier));
        }

        Ok(Self {
            max_attempts,
            initial_delay,
            max_delay,
            backoff_multiplier,
            jitter,
        })
    }

    /// Short delays for latency-sensitive calls (order placement).
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 1.5,
            jitter: true,
        }
    }

    /// Long delays for calls that should back off hard (reconnects, databases).
    pub fn conservative() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Total number of times an operation may run.
    pub fn total_attempts(&self) -> u32 {
        self.max_attempts.saturating_add(1)
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    pub fn jitter(&self) -> bool {
        self.jitter
    }

    /// Delay after the zero-based `attempt` fails, before jitter.
    ///
    /// `min(initial_delay * multiplier^attempt, max_delay)`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(scaled)
        }
    }

    /// Delay to actually sleep after the zero-based `attempt` fails.
    ///
    /// With jitter the base delay is moved by a uniform amount within ±10%.
    /// A zero initial delay never sleeps.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if !self.jitter || base.is_zero() {
            return base;
        }

        let secs = base.as_secs_f64();
        let spread = secs * JITTER_FRACTION;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_secs_f64((secs + offset).max(0.0))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl TryFrom<&RetrySettings> for RetryPolicy {
    type Error = PolicyError;

    fn try_from(settings: &RetrySettings) -> Result<Self, Self::Error> {
        Self::new(
            settings.max_attempts,
            Duration::from_millis(settings.initial_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
            settings.backoff_multiplier,
            settings.jitter,
        )
    }
}

/// Builder for retry policies; validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
    jitter: bool,
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        let defaults = RetryPolicy::default();
        Self {
            max_attempts: defaults.max_attempts,
            initial_delay: defaults.initial_delay,
            max_delay: defaults.max_delay,
            backoff_multiplier: defaults.backoff_multiplier,
            jitter: defaults.jitter,
        }
    }
}

impl RetryPolicyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn build(self) -> Result<RetryPolicy, PolicyError> {
        RetryPolicy::new(
            self.max_attempts,
            self.initial_delay,
            self.max_delay,
            self.backoff_multiplier,
            self.jitter,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_max_delay_below_initial() {
        let result = RetryPolicy::new(3, Duration::from_secs(5), Duration::from_secs(1), 2.0, false);
        assert!(matches!(result, Err(PolicyError::DelayBounds { .. })));
    }

    #[test]
    fn test_rejects_multiplier_not_above_one() {
        for multiplier in [1.0, 0.5, f64::NAN, f64::INFINITY] {
            let result = RetryPolicy::builder().backoff_multiplier(multiplier).build();
            assert!(matches!(result, Err(PolicyError::Multiplier(_))), "{multiplier}");
        }
    }

    #[test]
    fn test_exponential_schedule_capped_at_max_delay() {
        let policy = RetryPolicy::new(
            10,
            Duration::from_millis(100),
            Duration::from_millis(1000),
            2.0,
            false,
        )
        .unwrap();

        assert_eq!(policy.base_delay(0), Duration::from_millis(100));
        assert_eq!(policy.base_delay(1), Duration::from_millis(200));
        assert_eq!(policy.base_delay(2), Duration::from_millis(400));
        assert_eq!(policy.base_delay(3), Duration::from_millis(800));
        assert_eq!(policy.base_delay(4), Duration::from_millis(1000));
        assert_eq!(policy.base_delay(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn test_base_delay_non_decreasing() {
        let policy = RetryPolicy::aggressive();
        let mut previous = Duration::ZERO;
        for attempt in 0..64 {
            let delay = policy.base_delay(attempt);
            assert!(delay >= previous, "attempt {attempt}: {delay:?} < {previous:?}");
            assert!(delay <= policy.max_delay());
            previous = delay;
        }
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1000), Duration::from_secs(10), 2.0, true)
            .unwrap();
        for _ in 0..200 {
            let delay = policy.delay(0).as_secs_f64();
            assert!((0.9 - 1e-9..=1.1 + 1e-9).contains(&delay), "{delay}");
        }
    }

    #[test]
    fn test_zero_initial_delay_never_sleeps() {
        let policy = RetryPolicy::new(3, Duration::ZERO, Duration::from_secs(1), 2.0, true).unwrap();
        for attempt in 0..5 {
            assert_eq!(policy.delay(attempt), Duration::ZERO);
        }
    }

    #[test]
    fn test_from_settings() {
        let settings = RetrySettings {
            max_attempts: 2,
            initial_delay_ms: 250,
            max_delay_ms: 2_000,
            backoff_multiplier: 3.0,
            jitter: false,
        };
        let policy = RetryPolicy::try_from(&settings).unwrap();
        assert_eq!(policy.max_attempts(), 2);
        assert_eq!(policy.total_attempts(), 3);
        assert_eq!(policy.base_delay(1), Duration::from_millis(750));

        let bad = RetrySettings {
            max_delay_ms: 10,
            ..settings
        };
        assert!(RetryPolicy::try_from(&bad).is_err());
    }
}
