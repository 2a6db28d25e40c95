//! Latent Align Pipeline
//!
//! The stages that move a latent vector from one model's space into
//! another's and decide whether it is safe to release.
//!
//! # Architecture
//!
//! - [`alignment`]: ridge-regression alignment matrices, evaluation and a
//!   single-flight computation cache
//! - [`registry`]: versioned, certified storage of alignment matrices
//! - [`firewall`]: three-stage validator (statistical, adversarial, semantic)
//! - [`privacy`]: per-identity epsilon budgets and Gaussian-mechanism noise
//! - [`service`]: the `align` / `validate` / `register_compatibility` surface
//! - [`traits`]: pluggable collaborators (classifier, decoder, anchor data)
//! - [`stubs`]: deterministic collaborator implementations for tests and
//!   local runs
//!
//! # Example
//!
//! ```
//! use latent_align_pipeline::privacy::gaussian_sigma;
//!
//! let sigma = gaussian_sigma(1.0, 1e-5).unwrap();
//! assert!((sigma - 4.8448).abs() < 1e-3);
//! ```

pub mod alignment;
pub mod firewall;
pub mod privacy;
pub mod registry;
pub mod service;
pub mod stubs;
pub mod traits;

pub use alignment::{AlignmentEvaluation, AlignmentMatrixComputer};
pub use firewall::{FirewallState, LatentSpaceFirewall, ValidationReport};
pub use privacy::{PrivacyBudget, PrivacyBudgetManager, PrivacyReceipt};
pub use registry::{CompatibilityRegistry, EntryStatus, Registration, RegistryEntry};
pub use service::{AlignOptions, AlignOutcome, AlignmentService, PrivacyOptions, ServiceStats};
pub use traits::{AdversarialClassifier, AnchorSet, AnchorSource, SampleDecoder};
