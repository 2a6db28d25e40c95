//! Firewall model contracts.

use async_trait::async_trait;
use latent_align_core::{LatentVector, Result};

/// Binary adversarial classifier used by firewall stage 2.
///
/// Must return a score in `[0, 1]`; anything else (including NaN) is
/// treated by the firewall as an adversarial verdict.
#[async_trait]
pub trait AdversarialClassifier: Send + Sync {
    async fn classify(&self, vector: &LatentVector) -> Result<f64>;

    /// Identifier for logs.
    fn name(&self) -> &str {
        "classifier"
    }
}

/// Decoder used by firewall stage 3 to render a vector as text samples.
#[async_trait]
pub trait SampleDecoder: Send + Sync {
    /// Produce up to `n` text samples for `vector`.
    async fn decode_samples(&self, vector: &LatentVector, n: usize) -> Result<Vec<String>>;

    fn name(&self) -> &str {
        "decoder"
    }
}
