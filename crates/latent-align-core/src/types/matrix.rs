//! Alignment matrices (W) between two latent spaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metrics::{CertificationTier, QualityMetrics};
use super::model::{ModelId, ModelPair};
use super::version::SemanticVersion;
use crate::error::VectorError;

/// A `source_dim x target_dim` linear map plus provenance and quality data.
///
/// Weights are stored row-major: `weights[i * target_dim + j]` maps source
/// component `i` into target component `j`, so an aligned vector is
/// `y = x · W`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentMatrix {
    pub source_model: ModelId,
    pub target_model: ModelId,
    source_dim: usize,
    target_dim: usize,
    weights: Vec<f32>,
    pub version: SemanticVersion,
    pub metrics: QualityMetrics,
    /// Ridge regularisation strength used to fit the matrix.
    pub lambda: f64,
    /// Hash of the training activations, when fitted in-process.
    pub training_set_hash: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl AlignmentMatrix {
    /// # Errors
    /// - `VectorError::InvalidBatch` if a dimension is 0 or the weight count is wrong
    /// - `VectorError::NonFinite` if any weight is NaN/Inf
    pub fn new(
        source_model: ModelId,
        target_model: ModelId,
        source_dim: usize,
        target_dim: usize,
        weights: Vec<f32>,
        metrics: QualityMetrics,
    ) -> Result<Self, VectorError> {
        let matrix = Self {
            source_model,
            target_model,
            source_dim,
            target_dim,
            weights,
            version: SemanticVersion::default(),
            metrics,
            lambda: 0.0,
            training_set_hash: None,
            created_at: Utc::now(),
        };
        matrix.check_integrity()?;
        Ok(matrix)
    }

    /// Verify shape and finiteness of the weights.
    ///
    /// Needed after deserialisation, which bypasses [`new`](Self::new).
    pub fn check_integrity(&self) -> Result<(), VectorError> {
        let (source_dim, target_dim) = (self.source_dim, self.target_dim);
        if source_dim == 0 || target_dim == 0 {
            return Err(VectorError::InvalidBatch(format!(
                "alignment matrix shape {}x{} has a zero dimension",
                source_dim, target_dim
            )));
        }
        let expected = source_dim.checked_mul(target_dim).ok_or_else(|| {
            VectorError::InvalidBatch(format!(
                "alignment matrix shape {}x{} overflows",
                source_dim, target_dim
            ))
        })?;
        if self.weights.len() != expected {
            return Err(VectorError::InvalidBatch(format!(
                "alignment matrix {}x{} needs {} weights, got {}",
                source_dim,
                target_dim,
                expected,
                self.weights.len()
            )));
        }
        if let Some((index, value)) = self
            .weights
            .iter()
            .enumerate()
            .find(|(_, w)| !w.is_finite())
            .map(|(i, w)| (i, *w))
        {
            return Err(VectorError::NonFinite { index, value });
        }
        Ok(())
    }

    #[must_use]
    pub fn with_version(mut self, version: SemanticVersion) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: QualityMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    #[must_use]
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    #[must_use]
    pub fn with_training_set_hash(mut self, hash: u64) -> Self {
        self.training_set_hash = Some(hash);
        self
    }

    #[inline]
    pub fn source_dim(&self) -> usize {
        self.source_dim
    }

    #[inline]
    pub fn target_dim(&self) -> usize {
        self.target_dim
    }

    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Weight mapping source component `i` to target component `j`.
    #[inline]
    pub fn weight(&self, i: usize, j: usize) -> f32 {
        self.weights[i * self.target_dim + j]
    }

    pub fn pair(&self) -> ModelPair {
        ModelPair::new(self.source_model.clone(), self.target_model.clone())
    }

    /// Tier implied by the recorded metrics; `None` if below bronze.
    pub fn certification_tier(&self) -> Option<CertificationTier> {
        CertificationTier::assign(&self.metrics)
    }

    /// Approximate heap footprint of the weights in bytes.
    pub fn memory_size(&self) -> usize {
        self.weights.len() * std::mem::size_of::<f32>()
    }
}
