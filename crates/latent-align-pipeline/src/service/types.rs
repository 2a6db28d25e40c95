//! Request and response types of the service surface.

use latent_align_core::{CertificationTier, LatentVector, ModelId, SemanticVersion};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::privacy::PrivacyReceipt;

/// Differential-privacy parameters for one release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivacyOptions {
    /// Buyer/seller identity whose budget is debited.
    pub identity: String,
    pub epsilon: f64,
    pub delta: f64,
}

impl PrivacyOptions {
    pub fn new(identity: impl Into<String>, epsilon: f64, delta: f64) -> Self {
        Self {
            identity: identity.into(),
            epsilon,
            delta,
        }
    }
}

/// Per-call options for `align`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignOptions {
    /// Minimum certification tier; the service default applies when `None`.
    pub min_tier: Option<CertificationTier>,
    pub privacy: Option<PrivacyOptions>,
    /// Use the strict firewall thresholds for the input checks.
    pub strict_mode: bool,
    /// Correlates audit events; generated when `None`.
    pub request_id: Option<Uuid>,
}

impl AlignOptions {
    #[must_use]
    pub fn with_min_tier(mut self, tier: CertificationTier) -> Self {
        self.min_tier = Some(tier);
        self
    }

    #[must_use]
    pub fn with_privacy(mut self, privacy: PrivacyOptions) -> Self {
        self.privacy = Some(privacy);
        self
    }

    #[must_use]
    pub fn strict(mut self) -> Self {
        self.strict_mode = true;
        self
    }

    #[must_use]
    pub fn with_request_id(mut self, id: Uuid) -> Self {
        self.request_id = Some(id);
        self
    }
}

/// Result of a successful `align`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignOutcome {
    pub request_id: Uuid,
    /// In the target model's space; noised if privacy was requested.
    pub aligned_vector: LatentVector,
    pub source_model: ModelId,
    /// Recorded cosine similarity of the matrix used.
    pub confidence: f64,
    /// Cosine between the aligned vector and the naive truncate/zero-pad
    /// projection of the input. `None` when either is the zero vector.
    pub naive_agreement: Option<f64>,
    pub matrix_id: Uuid,
    pub matrix_version: SemanticVersion,
    pub tier: CertificationTier,
    pub processing_time_ms: u64,
    pub privacy: Option<PrivacyReceipt>,
}
