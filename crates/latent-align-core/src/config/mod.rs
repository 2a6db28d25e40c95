//! Root configuration for the alignment pipeline.
//!
//! # Loading Configuration
//!
//! ```rust,ignore
//! use latent_align_core::PipelineConfig;
//!
//! let config = PipelineConfig::from_file("latent-align.toml")?
//!     .with_env_overrides();
//! config.validate()?;
//! ```
//!
//! # TOML Structure
//!
//! ```toml
//! [alignment]
//! ridge_lambda = 0.001
//! compute_timeout_ms = 30000
//! default_min_tier = "silver"
//!
//! [firewall]
//! ks_threshold = 0.15
//! z_score_threshold = 5.0
//! adversarial_threshold = 0.85
//! stage_timeout_ms = 250
//!
//! [privacy]
//! default_epsilon_limit = 10.0
//! window_secs = 86400
//!
//! [registry]
//! retire_superseded = true
//!
//! [codec]
//! default_precision = "reduced"
//! ```
//!
//! Invalid configuration is an error, never silently replaced by defaults.

mod alignment;
mod codec;
mod firewall;
mod privacy;
mod registry;


pub use alignment::AlignmentConfig;
pub use codec::CodecConfig;
pub use firewall::{FirewallConfig, StrictThresholds};
pub use privacy::PrivacyConfig;
pub use registry::RegistryConfig;

use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

/// Root configuration aggregating every pipeline section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub alignment: AlignmentConfig,

    #[serde(default)]
    pub firewall: FirewallConfig,

    #[serde(default)]
    pub privacy: PrivacyConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub codec: CodecConfig,
}

impl PipelineConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// - `ConfigError::Read` if the file cannot be read
    /// - `ConfigError::Parse` if TOML parsing fails
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(format!("'{}': {}", path.display(), e)))
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Validate every section, returning the first failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.alignment.validate()?;
        self.firewall.validate()?;
        self.privacy.validate()?;
        self.registry.validate()?;
        Ok(())
    }

    /// Apply `LATENT_ALIGN_*` environment overrides.
    ///
    /// | Variable | Config Path |
    /// |----------|-------------|
    /// | `LATENT_ALIGN_RIDGE_LAMBDA` | `alignment.ridge_lambda` |
    /// | `LATENT_ALIGN_COMPUTE_TIMEOUT_MS` | `alignment.compute_timeout_ms` |
    /// | `LATENT_ALIGN_MIN_TIER` | `alignment.default_min_tier` |
    /// | `LATENT_ALIGN_CORRECTION_RANK` | `alignment.correction_rank` |
    /// | `LATENT_ALIGN_KS_THRESHOLD` | `firewall.ks_threshold` |
    /// | `LATENT_ALIGN_Z_THRESHOLD` | `firewall.z_score_threshold` |
    /// | `LATENT_ALIGN_ADVERSARIAL_THRESHOLD` | `firewall.adversarial_threshold` |
    /// | `LATENT_ALIGN_STAGE_TIMEOUT_MS` | `firewall.stage_timeout_ms` |
    /// | `LATENT_ALIGN_EPSILON_LIMIT` | `privacy.default_epsilon_limit` |
    /// | `LATENT_ALIGN_WINDOW_SECS` | `privacy.window_secs` |
    ///
    /// Unparseable values are logged and ignored; run [`validate`](Self::validate)
    /// afterwards to catch out-of-range ones.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_parse("LATENT_ALIGN_RIDGE_LAMBDA") {
            self.alignment.ridge_lambda = v;
        }
        if let Some(v) = env_parse("LATENT_ALIGN_COMPUTE_TIMEOUT_MS") {
            self.alignment.compute_timeout_ms = v;
        }
        if let Some(v) = env_parse("LATENT_ALIGN_MIN_TIER") {
            self.alignment.default_min_tier = v;
        }
        if let Some(v) = env_parse("LATENT_ALIGN_KS_THRESHOLD") {
            self.firewall.ks_threshold = v;
        }
        if let Some(v) = env_parse("LATENT_ALIGN_Z_THRESHOLD") {
            self.firewall.z_score_threshold = v;
        }
        if let Some(v) = env_parse("LATENT_ALIGN_ADVERSARIAL_THRESHOLD") {
            self.firewall.adversarial_threshold = v;
        }
        if let Some(v) = env_parse("LATENT_ALIGN_STAGE_TIMEOUT_MS") {
            self.firewall.stage_timeout_ms = v;
        }
        if let Some(v) = env_parse("LATENT_ALIGN_CORRECTION_RANK") {
            self.alignment.correction_rank = v;
        }
        if let Some(v) = env_parse("LATENT_ALIGN_EPSILON_LIMIT") {
            self.privacy.default_epsilon_limit = v;
        }
        if let Some(v) = env_parse("LATENT_ALIGN_WINDOW_SECS") {
            self.privacy.window_secs = v;
        }
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(target: "config", key = key, value = %raw, "Ignoring unparseable override");
            None
        }
    }
}
