//! Differential-privacy budget configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_epsilon_limit() -> f64 {
    10.0
}

fn default_window_secs() -> u64 {
    86_400
}

/// Per-identity epsilon accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivacyConfig {
    /// Epsilon limit assigned to identities without an explicit limit.
    #[serde(default = "default_epsilon_limit")]
    pub default_epsilon_limit: f64,

    /// Length of one accounting window in seconds. Unused budget does not
    /// roll over.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Fixed RNG seed for reproducible noise. Leave unset in production.
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            default_epsilon_limit: default_epsilon_limit(),
            window_secs: default_window_secs(),
            rng_seed: None,
        }
    }
}

impl PrivacyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.default_epsilon_limit.is_finite() || self.default_epsilon_limit <= 0.0 {
            return Err(ConfigError::invalid(
                "privacy",
                format!(
                    "default_epsilon_limit must be finite and > 0, got {}",
                    self.default_epsilon_limit
                ),
            ));
        }
        if self.window_secs == 0 {
            return Err(ConfigError::invalid("privacy", "window_secs must be > 0"));
        }
        Ok(())
    }
}
