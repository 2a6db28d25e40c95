//! Paired anchor activations for on-demand alignment.

use async_trait::async_trait;
use latent_align_core::error::VectorError;
use latent_align_core::{ActivationBatch, ModelPair, Result};

/// Paired activations of the same inputs in two models.
///
/// Row `i` of `source` and row `i` of `target` describe the same anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorSet {
    pub source: ActivationBatch,
    pub target: ActivationBatch,
}

impl AnchorSet {
    /// # Errors
    /// `VectorError::InvalidBatch` if the batches have different row counts.
    pub fn new(source: ActivationBatch, target: ActivationBatch) -> Result<Self> {
        if source.rows() != target.rows() {
            return Err(VectorError::InvalidBatch(format!(
                "anchor batches are not paired: {} source rows vs {} target rows",
                source.rows(),
                target.rows()
            ))
            .into());
        }
        Ok(Self { source, target })
    }

    /// Hash identifying this training set in the alignment cache.
    pub fn training_set_hash(&self) -> u64 {
        ActivationBatch::pair_hash(&self.source, &self.target)
    }
}

/// Supplies anchor activations for a model pair, if any are known.
#[async_trait]
pub trait AnchorSource: Send + Sync {
    async fn anchors(&self, pair: &ModelPair) -> Result<Option<AnchorSet>>;
}
