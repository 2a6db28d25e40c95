//! Latent-space firewall thresholds.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_ks_threshold() -> f64 {
    0.15
}

fn default_z_score_threshold() -> f64 {
    5.0
}

fn default_ks_min_dimension() -> usize {
    32
}

fn default_adversarial_threshold() -> f64 {
    0.85
}

fn default_stage_timeout_ms() -> u64 {
    250
}

fn default_decoder_samples() -> usize {
    4
}

fn default_strict_ks_threshold() -> f64 {
    0.10
}

fn default_strict_z_score_threshold() -> f64 {
    4.0
}

fn default_strict_adversarial_threshold() -> f64 {
    0.70
}

/// Thresholds applied by `validate` in strict mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrictThresholds {
    #[serde(default = "default_strict_ks_threshold")]
    pub ks_threshold: f64,
    #[serde(default = "default_strict_z_score_threshold")]
    pub z_score_threshold: f64,
    #[serde(default = "default_strict_adversarial_threshold")]
    pub adversarial_threshold: f64,
}

impl Default for StrictThresholds {
    fn default() -> Self {
        Self {
            ks_threshold: default_strict_ks_threshold(),
            z_score_threshold: default_strict_z_score_threshold(),
            adversarial_threshold: default_strict_adversarial_threshold(),
        }
    }
}

/// Configuration for the three firewall stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirewallConfig {
    /// Maximum Kolmogorov-Smirnov statistic against N(0,1) after standardising.
    #[serde(default = "default_ks_threshold")]
    pub ks_threshold: f64,

    /// Maximum absolute per-component z-score.
    #[serde(default = "default_z_score_threshold")]
    pub z_score_threshold: f64,

    /// KS is only meaningful with enough samples; below this dimension the
    /// Gaussianity check is skipped (NaN/Inf and z-score checks still run).
    #[serde(default = "default_ks_min_dimension")]
    pub ks_min_dimension: usize,

    /// Reject when the adversarial classifier score exceeds this.
    #[serde(default = "default_adversarial_threshold")]
    pub adversarial_threshold: f64,

    /// Time budget for each pluggable-model stage (classifier, decoder).
    #[serde(default = "default_stage_timeout_ms")]
    pub stage_timeout_ms: u64,

    /// Number of samples requested from the decoder in stage 3.
    #[serde(default = "default_decoder_samples")]
    pub decoder_samples: usize,

    /// Extra regex patterns scanned in stage 3, on top of the built-in set.
    #[serde(default)]
    pub extra_patterns: Vec<String>,

    #[serde(default)]
    pub strict: StrictThresholds,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            ks_threshold: default_ks_threshold(),
            z_score_threshold: default_z_score_threshold(),
            ks_min_dimension: default_ks_min_dimension(),
            adversarial_threshold: default_adversarial_threshold(),
            stage_timeout_ms: default_stage_timeout_ms(),
            decoder_samples: default_decoder_samples(),
            extra_patterns: Vec::new(),
            strict: StrictThresholds::default(),
        }
    }
}

impl FirewallConfig {
    /// # Errors
    /// `ConfigError::Invalid` for out-of-range thresholds, a zero timeout or
    /// zero decoder samples.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("ks_threshold", self.ks_threshold),
            ("strict.ks_threshold", self.strict.ks_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::invalid(
                    "firewall",
                    format!("{} must be in (0, 1], got {}", name, value),
                ));
            }
        }
        for (name, value) in [
            ("z_score_threshold", self.z_score_threshold),
            ("strict.z_score_threshold", self.strict.z_score_threshold),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::invalid(
                    "firewall",
                    format!("{} must be finite and > 0, got {}", name, value),
                ));
            }
        }
        for (name, value) in [
            ("adversarial_threshold", self.adversarial_threshold),
            ("strict.adversarial_threshold", self.strict.adversarial_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(
                    "firewall",
                    format!("{} must be in [0, 1], got {}", name, value),
                ));
            }
        }
        if self.stage_timeout_ms == 0 {
            return Err(ConfigError::invalid("firewall", "stage_timeout_ms must be > 0"));
        }
        if self.decoder_samples == 0 {
            return Err(ConfigError::invalid("firewall", "decoder_samples must be > 0"));
        }
        Ok(())
    }
}
