//! Alignment quality metrics and certification tiers.
//!
//! # Tier thresholds
//!
//! Applied strictest-first; the first tier whose conditions hold wins.
//!
//! | Tier | cosine | euclidean | task preservation |
//! |------|--------|-----------|-------------------|
//! | platinum | >= 0.92 | <= 0.08 | >= 0.95 |
//! | gold | >= 0.92 | <= 0.08 | - |
//! | silver | >= 0.85 | <= 0.15 | - |
//! | bronze | >= 0.75 | - | - |
//!
//! Anything below bronze is not usable in production and cannot be
//! registered. Every condition is a one-sided threshold, so improving any
//! single metric can never lower the assigned tier.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

pub const GOLD_MIN_COSINE: f64 = 0.92;
pub const GOLD_MAX_EUCLIDEAN: f64 = 0.08;
pub const PLATINUM_MIN_TASK_PRESERVATION: f64 = 0.95;
pub const SILVER_MIN_COSINE: f64 = 0.85;
pub const SILVER_MAX_EUCLIDEAN: f64 = 0.15;
pub const BRONZE_MIN_COSINE: f64 = 0.75;

/// Measured fidelity of an alignment matrix over a sample set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Mean cosine similarity between aligned and reference vectors, in [-1, 1].
    pub cosine_similarity: f64,
    /// Root-mean-square per-component deviation, >= 0.
    pub euclidean_distance: f64,
    /// Fraction of downstream task behaviour preserved, in [0, 1].
    pub task_preservation: f64,
    /// Number of samples the metrics were measured on.
    pub sample_count: u64,
}

impl QualityMetrics {
    /// Create validated metrics.
    ///
    /// # Errors
    /// `RegistryError::InvalidMetrics` if any value is non-finite or out of range.
    pub fn new(
        cosine_similarity: f64,
        euclidean_distance: f64,
        task_preservation: f64,
        sample_count: u64,
    ) -> Result<Self, RegistryError> {
        let metrics = Self {
            cosine_similarity,
            euclidean_distance,
            task_preservation,
            sample_count,
        };
        metrics.validate()?;
        Ok(metrics)
    }

    /// # Errors
    /// `RegistryError::InvalidMetrics` describing the first violated range.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if !self.cosine_similarity.is_finite() || !(-1.0..=1.0).contains(&self.cosine_similarity)
        {
            return Err(RegistryError::InvalidMetrics(format!(
                "cosine_similarity {} outside [-1, 1]",
                self.cosine_similarity
            )));
        }
        if !self.euclidean_distance.is_finite() || self.euclidean_distance < 0.0 {
            return Err(RegistryError::InvalidMetrics(format!(
                "euclidean_distance {} must be finite and >= 0",
                self.euclidean_distance
            )));
        }
        if !self.task_preservation.is_finite() || !(0.0..=1.0).contains(&self.task_preservation)
        {
            return Err(RegistryError::InvalidMetrics(format!(
                "task_preservation {} outside [0, 1]",
                self.task_preservation
            )));
        }
        Ok(())
    }
}

/// Quality grade of an alignment matrix. Ordered bronze < silver < gold < platinum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificationTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl CertificationTier {
    /// All tiers, weakest first.
    pub fn all() -> &'static [CertificationTier] {
        &[
            CertificationTier::Bronze,
            CertificationTier::Silver,
            CertificationTier::Gold,
            CertificationTier::Platinum,
        ]
    }

    /// Assign a tier from metrics. `None` means below bronze.
    ///
    /// Pure function of cosine, euclidean and task preservation.
    pub fn assign(metrics: &QualityMetrics) -> Option<Self> {
        let cos = metrics.cosine_similarity;
        let euc = metrics.euclidean_distance;
        let task = metrics.task_preservation;

        if cos >= GOLD_MIN_COSINE && euc <= GOLD_MAX_EUCLIDEAN {
            if task >= PLATINUM_MIN_TASK_PRESERVATION {
                return Some(Self::Platinum);
            }
            return Some(Self::Gold);
        }
        if cos >= SILVER_MIN_COSINE && euc <= SILVER_MAX_EUCLIDEAN {
            return Some(Self::Silver);
        }
        if cos >= BRONZE_MIN_COSINE {
            return Some(Self::Bronze);
        }
        None
    }

    /// Trust weight used by downstream ranking (platinum 1.0 .. bronze 0.4).
    pub const fn certification_score(self) -> f64 {
        match self {
            Self::Platinum => 1.0,
            Self::Gold => 0.8,
            Self::Silver => 0.6,
            Self::Bronze => 0.4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
            Self::Platinum => "platinum",
        }
    }
}

impl fmt::Display for CertificationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertificationTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bronze" => Ok(Self::Bronze),
            "silver" => Ok(Self::Silver),
            "gold" => Ok(Self::Gold),
            "platinum" => Ok(Self::Platinum),
            other => Err(format!("unknown certification tier '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(cos: f64, euc: f64, task: f64) -> QualityMetrics {
        QualityMetrics::new(cos, euc, task, 100).expect("valid metrics")
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(CertificationTier::assign(&m(0.92, 0.08, 0.95)), Some(CertificationTier::Platinum));
        assert_eq!(CertificationTier::assign(&m(0.92, 0.08, 0.949)), Some(CertificationTier::Gold));
        assert_eq!(CertificationTier::assign(&m(0.919, 0.08, 1.0)), Some(CertificationTier::Silver));
        assert_eq!(CertificationTier::assign(&m(0.85, 0.15, 0.0)), Some(CertificationTier::Silver));
        assert_eq!(CertificationTier::assign(&m(0.95, 0.151, 1.0)), Some(CertificationTier::Bronze));
        assert_eq!(CertificationTier::assign(&m(0.75, 5.0, 0.0)), Some(CertificationTier::Bronze));
        assert_eq!(CertificationTier::assign(&m(0.749, 0.0, 1.0)), None);
    }

    #[test]
    fn test_tier_is_monotonic_in_each_metric() {
        let grid = [0.0, 0.5, 0.74, 0.75, 0.8, 0.85, 0.9, 0.92, 0.95, 1.0];
        let dists = [0.0, 0.05, 0.08, 0.1, 0.15, 0.2, 1.0];
        for &cos in &grid {
            for &euc in &dists {
                for &task in &grid {
                    let base = CertificationTier::assign(&m(cos, euc, task));
                    for &better_cos in grid.iter().filter(|&&c| c >= cos) {
                        assert!(CertificationTier::assign(&m(better_cos, euc, task)) >= base);
                    }
                    for &better_euc in dists.iter().filter(|&&d| d <= euc) {
                        assert!(CertificationTier::assign(&m(cos, better_euc, task)) >= base);
                    }
                    for &better_task in grid.iter().filter(|&&t| t >= task) {
                        assert!(CertificationTier::assign(&m(cos, euc, better_task)) >= base);
                    }
                }
            }
        }
    }

    #[test]
    fn test_metrics_validation() {
        assert!(QualityMetrics::new(1.01, 0.0, 0.5, 1).is_err());
        assert!(QualityMetrics::new(0.9, -0.1, 0.5, 1).is_err());
        assert!(QualityMetrics::new(0.9, 0.1, 1.5, 1).is_err());
        assert!(QualityMetrics::new(f64::NAN, 0.1, 0.5, 1).is_err());
        assert!(QualityMetrics::new(-1.0, 0.0, 0.0, 0).is_ok());
    }

    #[test]
    fn test_tier_ordering_and_parse() {
        assert!(CertificationTier::Bronze < CertificationTier::Silver);
        assert!(CertificationTier::Gold < CertificationTier::Platinum);
        assert_eq!("GOLD".parse::<CertificationTier>().unwrap(), CertificationTier::Gold);
        assert!("tin".parse::<CertificationTier>().is_err());
        assert_eq!(CertificationTier::Silver.certification_score(), 0.6);
    }
}
