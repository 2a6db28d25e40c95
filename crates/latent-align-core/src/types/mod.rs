//! Domain types for the alignment pipeline.
//!
//! All types here are plain data: immutable once constructed, validated at
//! construction, and serde-serializable so they can cross process
//! boundaries or be persisted in registry snapshots.

mod batch;
mod matrix;
mod metrics;
mod model;
mod validation;
mod vector;
mod version;

pub use batch::ActivationBatch;
pub use matrix::AlignmentMatrix;
pub use metrics::{
    CertificationTier, QualityMetrics, BRONZE_MIN_COSINE, GOLD_MAX_EUCLIDEAN, GOLD_MIN_COSINE,
    PLATINUM_MIN_TASK_PRESERVATION, SILVER_MAX_EUCLIDEAN, SILVER_MIN_COSINE,
};
pub use model::{ModelId, ModelPair, MAX_MODEL_ID_LEN};
pub use validation::{FirewallStage, RejectionReason};
pub use vector::{LatentVector, Precision};
pub use version::SemanticVersion;
