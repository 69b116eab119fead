//! Exponential backoff with a bounded retry budget.
//!
//! A [`RetryBudget`] tracks consecutive failures of one operation. Each
//! failure yields the delay to wait before the next attempt; once
//! `max_retries` consecutive failures have been seen the budget is exhausted,
//! the breaker is open, and the caller must treat the condition as fatal.
//! Any success closes the breaker and resets the count.

use std::time::Duration;

use thiserror::Error;

/// Configuration for exponential backoff retry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Consecutive failures tolerated before the breaker opens.
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Cap for exponential growth.
    pub max_delay: Duration,

    /// Multiplier applied per attempt (typically 2.0).
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// 0.5s, 1s, 2s ... capped at 30s, ten attempts (~2.5 minutes of outage).
    pub const DEFAULT: Self = Self {
        max_retries: 10,
        initial_delay: Duration::from_millis(500),
        max_delay: Duration::from_secs(30),
        backoff_multiplier: 2.0,
    };

    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Delay for the given retry attempt (0-indexed):
    /// `initial_delay * backoff_multiplier^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped_secs)
    }

    /// Total time spent waiting if every retry fails.
    pub fn total_max_wait(&self) -> Duration {
        (0..self.max_retries).map(|a| self.delay_for_attempt(a)).sum()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Last attempt succeeded (or nothing has failed yet).
    Closed,
    /// Failing, still within budget.
    Retrying,
    /// Budget exhausted. Terminal until [`RetryBudget::reset`].
    Open,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("retry budget exhausted after {attempts} consecutive failures")]
pub struct BudgetExhausted {
    pub attempts: u32,
}

/// Consecutive-failure tracker for one operation.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    config: RetryConfig,
    consecutive_failures: u32,
    total_failures: u64,
    state: BreakerState,
}

impl RetryBudget {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            consecutive_failures: 0,
            total_failures: 0,
            state: BreakerState::Closed,
        }
    }

    /// Record a failed attempt.
    ///
    /// Returns how long to wait before the next attempt, or
    /// [`BudgetExhausted`] once the breaker opens.
    pub fn record_failure(&mut self) -> Result<Duration, BudgetExhausted> {
        self.total_failures += 1;
        self.consecutive_failures += 1;

        if self.consecutive_failures > self.config.max_retries {
            self.state = BreakerState::Open;
            return Err(BudgetExhausted {
                attempts: self.consecutive_failures,
            });
        }

        self.state = BreakerState::Retrying;
        Ok(self
            .config
            .delay_for_attempt(self.consecutive_failures - 1))
    }

    /// Record a successful attempt; closes the breaker.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.state = BreakerState::Closed;
    }

    pub fn reset(&mut self) {
        self.record_success();
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == BreakerState::Open
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}
