//! Pluggable collaborators consumed by the pipeline.
//!
//! The firewall's classifier and decoder, and the source of paired anchor
//! activations, are external models. They are injected at construction
//! time as trait objects so that tests can substitute deterministic
//! doubles.

mod anchors;
mod models;

pub use anchors::{AnchorSet, AnchorSource};
pub use models::{AdversarialClassifier, SampleDecoder};
