//! Deterministic collaborator implementations.
//!
//! Used by tests and the smoke binary. None of these load a model:
//! - [`StaticClassifier`] / [`StaticDecoder`]: fixed answers, optional delay
//!   or failure, with call counting
//! - [`TailMassClassifier`]: heuristic score from heavy-tail mass
//! - [`VocabularyDecoder`]: maps vector chunks onto a fixed vocabulary
//! - [`InMemoryAnchorSource`]: anchor activations held in memory

mod anchors;
mod classifier;
mod decoder;

pub use anchors::InMemoryAnchorSource;
pub use classifier::{StaticClassifier, TailMassClassifier};
pub use decoder::{StaticDecoder, VocabularyDecoder};
