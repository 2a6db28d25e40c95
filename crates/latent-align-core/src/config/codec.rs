//! Wire codec configuration.

use serde::{Deserialize, Serialize};

use crate::types::Precision;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Precision used when framing aligned vectors for transport.
    #[serde(default)]
    pub default_precision: Precision,
}
