//! Alignment matrix computation configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::CertificationTier;

fn default_ridge_lambda() -> f64 {
    1e-3
}

fn default_compute_timeout_ms() -> u64 {
    30_000
}

fn default_min_tier() -> CertificationTier {
    CertificationTier::Silver
}

fn default_compute_on_demand() -> bool {
    true
}

fn default_correction_rank() -> usize {
    64
}

/// Controls ridge fitting and how `align` resolves matrices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentConfig {
    /// Ridge regularisation strength. Must be > 0: plain least squares is
    /// not supported.
    #[serde(default = "default_ridge_lambda")]
    pub ridge_lambda: f64,

    /// Wall-clock budget for one `compute_alignment` run (milliseconds).
    /// Exceeding it is fatal for that run.
    #[serde(default = "default_compute_timeout_ms")]
    pub compute_timeout_ms: u64,

    /// Minimum tier `align` accepts when the caller does not specify one.
    #[serde(default = "default_min_tier")]
    pub default_min_tier: CertificationTier,

    /// Fit a matrix from anchor data when none is registered.
    #[serde(default = "default_compute_on_demand")]
    pub compute_on_demand: bool,

    /// Rank of the residual correction folded into a freshly fitted matrix.
    /// 0 disables the correction and keeps the plain ridge solution.
    #[serde(default = "default_correction_rank")]
    pub correction_rank: usize,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            ridge_lambda: default_ridge_lambda(),
            compute_timeout_ms: default_compute_timeout_ms(),
            default_min_tier: default_min_tier(),
            compute_on_demand: default_compute_on_demand(),
            correction_rank: default_correction_rank(),
        }
    }
}

impl AlignmentConfig {
    /// # Errors
    /// - `ConfigError::Invalid` if ridge_lambda is not finite and > 0
    /// - `ConfigError::Invalid` if compute_timeout_ms is 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.ridge_lambda.is_finite() || self.ridge_lambda <= 0.0 {
            return Err(ConfigError::invalid(
                "alignment",
                format!("ridge_lambda must be finite and > 0, got {}", self.ridge_lambda),
            ));
        }
        if self.compute_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "alignment",
                "compute_timeout_ms must be > 0",
            ));
        }
        Ok(())
    }
}
