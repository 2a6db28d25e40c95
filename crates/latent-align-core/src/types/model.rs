//! Model identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VectorError;

/// Maximum byte length of a model id.
///
/// Packet headers reserve a fixed 32-byte slot per model id.
pub const MAX_MODEL_ID_LEN: usize = 32;

/// Identifier of a model whose latent space vectors live in.
///
/// Restricted to 1..=32 ASCII bytes drawn from `[A-Za-z0-9._:/-]` so that it
/// fits the fixed-size packet header without escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelId(String);

impl ModelId {
    /// Create a validated model id.
    ///
    /// # Errors
    /// `VectorError::InvalidModelId` if the id is empty, too long, or
    /// contains characters outside the allowed set.
    pub fn new(id: impl Into<String>) -> Result<Self, VectorError> {
        let id = id.into();
        if id.is_empty() {
            return Err(VectorError::InvalidModelId {
                id,
                reason: "must not be empty".to_string(),
            });
        }
        if id.len() > MAX_MODEL_ID_LEN {
            return Err(VectorError::InvalidModelId {
                reason: format!("length {} exceeds {}", id.len(), MAX_MODEL_ID_LEN),
                id,
            });
        }
        if let Some(bad) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '/' | '-')))
        {
            return Err(VectorError::InvalidModelId {
                reason: format!("invalid character {:?}", bad),
                id,
            });
        }
        Ok(Self(id))
    }

    /// Borrow the id as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ModelId {
    type Err = VectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ModelId {
    type Error = VectorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ModelId> for String {
    fn from(id: ModelId) -> Self {
        id.0
    }
}

/// Ordered (source, target) pair of models.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelPair {
    pub source: ModelId,
    pub target: ModelId,
}

impl ModelPair {
    pub fn new(source: ModelId, target: ModelId) -> Self {
        Self { source, target }
    }
}

impl fmt::Display for ModelPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.source, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_id_accepts_typical_names() {
        for name in ["model-a", "llama-3-8b", "org/model_v2.1", "gpt:4"] {
            let id = ModelId::new(name).expect("valid id");
            assert_eq!(id.as_str(), name);
        }
    }

    #[test]
    fn test_model_id_rejects_empty_long_and_spaces() {
        assert!(ModelId::new("").is_err());
        assert!(ModelId::new("x".repeat(MAX_MODEL_ID_LEN + 1)).is_err());
        assert!(ModelId::new("has space").is_err());
        assert!(ModelId::new("x".repeat(MAX_MODEL_ID_LEN)).is_ok());
    }

    #[test]
    fn test_model_id_serde_validates() {
        let ok: ModelId = serde_json::from_str("\"model-b\"").expect("deserialize");
        assert_eq!(ok.as_str(), "model-b");
        let bad: Result<ModelId, _> = serde_json::from_str("\"bad id\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_model_pair_display() {
        let pair = ModelPair::new(
            ModelId::new("model-a").unwrap(),
            ModelId::new("model-b").unwrap(),
        );
        assert_eq!(pair.to_string(), "model-a->model-b");
    }
}
