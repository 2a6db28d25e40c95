//! Per-identity epsilon accounting.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Time source for window accounting.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Epsilon consumption of one identity within the current window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivacyBudget {
    pub identity: String,
    pub epsilon_consumed: f64,
    pub epsilon_limit: f64,
    pub window_start: DateTime<Utc>,
}

impl PrivacyBudget {
    pub fn new(identity: impl Into<String>, epsilon_limit: f64, now: DateTime<Utc>) -> Self {
        Self {
            identity: identity.into(),
            epsilon_consumed: 0.0,
            epsilon_limit,
            window_start: now,
        }
    }

    pub fn remaining(&self) -> f64 {
        (self.epsilon_limit - self.epsilon_consumed).max(0.0)
    }

    pub fn resets_at(&self, window: Duration) -> DateTime<Utc> {
        self.window_start
            .checked_add_signed(window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Start a fresh window if the current one has elapsed. Unused budget
    /// does not carry over.
    pub(crate) fn roll_window(&mut self, now: DateTime<Utc>, window: Duration) -> bool {
        if now >= self.resets_at(window) {
            self.epsilon_consumed = 0.0;
            self.window_start = now;
            return true;
        }
        false
    }

    pub(crate) fn can_afford(&self, epsilon: f64) -> bool {
        self.epsilon_consumed + epsilon <= self.epsilon_limit
    }
}
