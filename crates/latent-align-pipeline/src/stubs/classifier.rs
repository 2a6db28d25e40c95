//! Adversarial classifier stubs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use latent_align_core::{math, AlignError, LatentVector, Result};

use crate::traits::AdversarialClassifier;

/// Returns a fixed score (or a fixed failure).
#[derive(Debug)]
pub struct StaticClassifier {
    score: Option<f64>,
    delay: Option<Duration>,
    calls: AtomicU64,
}

impl StaticClassifier {
    pub fn new(score: f64) -> Self {
        Self {
            score: Some(score),
            delay: None,
            calls: AtomicU64::new(0),
        }
    }

    /// Always errors.
    pub fn failing() -> Self {
        Self {
            score: None,
            delay: None,
            calls: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdversarialClassifier for StaticClassifier {
    async fn classify(&self, _vector: &LatentVector) -> Result<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.score
            .ok_or_else(|| AlignError::internal("static classifier configured to fail"))
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Scores a vector by how much of its mass sits beyond three standard
/// deviations, relative to a Gaussian (~0.27%).
///
/// Crafted perturbations tend to concentrate energy in a few components;
/// natural activations rarely do.
#[derive(Debug, Clone, Copy)]
pub struct TailMassClassifier {
    /// Tail fraction that maps to a score of 1.0.
    saturation: f64,
}

impl Default for TailMassClassifier {
    fn default() -> Self {
        Self { saturation: 0.05 }
    }
}

impl TailMassClassifier {
    pub fn new(saturation: f64) -> Self {
        Self {
            saturation: saturation.max(f64::EPSILON),
        }
    }
}

#[async_trait]
impl AdversarialClassifier for TailMassClassifier {
    async fn classify(&self, vector: &LatentVector) -> Result<f64> {
        let (mean, std) = math::mean_std(vector.components());
        if std <= 0.0 || !std.is_finite() {
            return Ok(0.0);
        }
        let tail = vector
            .components()
            .iter()
            .filter(|&&x| ((f64::from(x) - mean) / std).abs() > 3.0)
            .count();
        let fraction = tail as f64 / vector.dimension() as f64;
        Ok((fraction / self.saturation).clamp(0.0, 1.0))
    }

    fn name(&self) -> &str {
        "tail-mass"
    }
}
