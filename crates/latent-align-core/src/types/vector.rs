//! Latent activation vectors.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::model::ModelId;
use crate::error::VectorError;
use crate::math;

/// Component precision of a latent vector on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    /// IEEE-754 binary32, 4 bytes per component.
    Full,
    /// bfloat16 (binary32 with a truncated 7-bit mantissa), 2 bytes per component.
    #[default]
    Reduced,
}

impl Precision {
    /// Bytes used to store one component.
    #[inline]
    pub const fn bytes_per_component(self) -> usize {
        match self {
            Self::Full => 4,
            Self::Reduced => 2,
        }
    }

    /// Compression ratio relative to full precision.
    #[inline]
    pub const fn compression_ratio(self) -> f32 {
        match self {
            Self::Full => 1.0,
            Self::Reduced => 2.0,
        }
    }

    /// Single-byte wire tag.
    #[inline]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Full => 0,
            Self::Reduced => 1,
        }
    }

    /// Parse a wire tag.
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Full),
            1 => Some(Self::Reduced),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Reduced => "reduced",
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A latent activation vector extracted from one layer of a model.
///
/// Immutable once created: every transform (alignment, noise injection,
/// decoding) produces a new instance. Non-finite components are allowed at
/// construction so that the firewall can observe and reject them; use
/// [`LatentVector::check_finite`] where finiteness is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatentVector {
    model_id: ModelId,
    layer_depth: u32,
    precision: Precision,
    components: Vec<f32>,
}

impl LatentVector {
    /// Create a full-precision vector.
    ///
    /// # Errors
    /// - `VectorError::Empty` if `components` is empty
    /// - `VectorError::InvalidLayerDepth` if `layer_depth` is 0
    pub fn new(
        model_id: ModelId,
        layer_depth: u32,
        components: Vec<f32>,
    ) -> Result<Self, VectorError> {
        Self::with_precision(model_id, layer_depth, Precision::Full, components)
    }

    /// Create a vector tagged with an explicit precision.
    pub fn with_precision(
        model_id: ModelId,
        layer_depth: u32,
        precision: Precision,
        components: Vec<f32>,
    ) -> Result<Self, VectorError> {
        if components.is_empty() {
            return Err(VectorError::Empty);
        }
        if layer_depth == 0 {
            return Err(VectorError::InvalidLayerDepth(layer_depth));
        }
        Ok(Self {
            model_id,
            layer_depth,
            precision,
            components,
        })
    }

    /// Derive a new vector in `model_id`'s space at the same layer depth.
    ///
    /// The derived vector is always full precision.
    pub fn derive(&self, model_id: ModelId, components: Vec<f32>) -> Result<Self, VectorError> {
        Self::new(model_id, self.layer_depth, components)
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.components.len()
    }

    #[inline]
    pub fn model_id(&self) -> &ModelId {
        &self.model_id
    }

    #[inline]
    pub fn layer_depth(&self) -> u32 {
        self.layer_depth
    }

    #[inline]
    pub fn precision(&self) -> Precision {
        self.precision
    }

    #[inline]
    pub fn components(&self) -> &[f32] {
        &self.components
    }

    /// Consume the vector and return its components.
    pub fn into_components(self) -> Vec<f32> {
        self.components
    }

    /// Return the index and value of the first NaN/Inf component.
    pub fn first_non_finite(&self) -> Option<(usize, f32)> {
        self.components
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite())
            .map(|(i, v)| (i, *v))
    }

    /// # Errors
    /// `VectorError::NonFinite` naming the first offending component.
    pub fn check_finite(&self) -> Result<(), VectorError> {
        match self.first_non_finite() {
            Some((index, value)) => Err(VectorError::NonFinite { index, value }),
            None => Ok(()),
        }
    }

    /// # Errors
    /// `VectorError::DimensionMismatch` if `self.dimension() != expected`.
    pub fn check_dimension(&self, expected: usize) -> Result<(), VectorError> {
        if self.dimension() != expected {
            return Err(VectorError::DimensionMismatch {
                expected,
                actual: self.dimension(),
            });
        }
        Ok(())
    }

    pub fn l2_norm(&self) -> f64 {
        math::l2_norm(&self.components)
    }

    /// True if every component is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.components.iter().all(|&v| v == 0.0)
    }
}
