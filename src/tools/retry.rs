use rand::Rng;
use std::time::Duration;

use crate::error::ToolError;

/// Exponential backoff with jitter
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    /// When set, each delay is scaled by a random factor in `[0.5, 1.0]`
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            factor: 2.0,
            max_delay: Duration::from_secs(4),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Un-jittered delay after failed attempt `attempt` (1-based)
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.factor.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt);
        if !self.jitter || nominal.is_zero() {
            return nominal;
        }
        let scale: f64 = rand::rng().random_range(0.5..=1.0);
        nominal.mul_f64(scale)
    }

    /// Nominal delays between consecutive attempts
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|a| self.nominal_delay(a)).collect()
    }
}

/// Per-call retry bookkeeping; lives only for the duration of one call
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    pub attempt_count: u32,
    pub last_error: Option<ToolError>,
    pub backoff_schedule: Vec<Duration>,
}

impl RetryState {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt_count: 0,
            last_error: None,
            backoff_schedule: policy.schedule(),
        }
    }

    /// Whether another attempt is allowed after the one just recorded
    pub fn should_retry(&self, policy: &RetryPolicy) -> bool {
        match &self.last_error {
            Some(error) => error.is_retryable() && self.attempt_count < policy.max_attempts,
            None => false,
        }
    }
}
