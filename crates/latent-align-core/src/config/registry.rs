//! Compatibility registry configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_retire_superseded() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// JSON snapshot loaded at start-up, if present.
    #[serde(default)]
    pub snapshot_path: Option<String>,

    /// Retire older versions when a newer one at equal-or-better tier arrives.
    #[serde(default = "default_retire_superseded")]
    pub retire_superseded: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            retire_superseded: default_retire_superseded(),
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.snapshot_path {
            if path.trim().is_empty() {
                return Err(ConfigError::invalid(
                    "registry",
                    "snapshot_path must not be blank when set",
                ));
            }
        }
        Ok(())
    }
}
