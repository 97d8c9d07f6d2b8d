// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Retry policy for transient run failures.
//!
//! The state machine never retries a run locally. The policy only computes the
//! metadata attached to a transient-failure proposal, and decides when a
//! transient failure has to become permanent.

use std::time::Duration;

/// Exponential backoff policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Multiplier applied to the delay after each attempt.
    pub factor: f64,
    /// Upper bound for a single delay.
    pub max_interval: Option<Duration>,
    /// Attempts after which a transient failure becomes permanent.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Policy that never gives up and doubles the delay from `initial_interval`.
    pub fn exponential(initial_interval: Duration) -> Self {
        Self {
            initial_interval,
            factor: 2.0,
            max_interval: None,
            max_attempts: None,
        }
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Delay before retrying after `attempt` (1-indexed) failed, or `None`
    /// when the policy is exhausted.
    pub fn next_retry_delay(&self, attempt: u32) -> Option<Duration> {
        if let Some(max_attempts) = self.max_attempts {
            if attempt >= max_attempts {
                return None;
            }
        }
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let millis = self.initial_interval.as_millis() as f64 * self.factor.powi(exponent);
        let mut delay = if millis.is_finite() && millis < u64::MAX as f64 {
            Duration::from_millis(millis.round() as u64)
        } else {
            Duration::from_millis(u64::MAX)
        };
        if let Some(max_interval) = self.max_interval {
            delay = delay.min(max_interval);
        }
        Some(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(Duration::from_millis(50))
    }
}
