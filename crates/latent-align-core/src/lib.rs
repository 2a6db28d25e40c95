//! Latent Align Core Library
//!
//! Domain types, error taxonomy, configuration and the wire codec shared by
//! every stage of the cross-model latent alignment pipeline.
//!
//! # Architecture
//!
//! This crate defines:
//! - Domain types (`LatentVector`, `AlignmentMatrix`, `QualityMetrics`, etc.)
//! - The unified [`AlignError`] and its sub-errors
//! - [`PipelineConfig`] with TOML loading and `LATENT_ALIGN_*` env overrides
//! - [`codec::VectorCodec`] for reduced-precision encoding and packet framing
//!
//! The pipeline stages themselves (ridge solver, registry, firewall, privacy
//! budgeting, orchestration) live in `latent-align-pipeline`.
//!
//! # Example
//!
//! ```
//! use latent_align_core::types::{CertificationTier, QualityMetrics};
//!
//! let metrics = QualityMetrics::new(0.93, 0.05, 0.97, 512).unwrap();
//! assert_eq!(CertificationTier::assign(&metrics), Some(CertificationTier::Platinum));
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod math;
pub mod types;

// Re-exports for convenience
pub use config::PipelineConfig;
pub use error::{AlignError, Result};
pub use types::{
    ActivationBatch, AlignmentMatrix, CertificationTier, FirewallStage, LatentVector, ModelId,
    ModelPair, Precision, QualityMetrics, RejectionReason, SemanticVersion,
};
