//! Stage 1: deterministic statistical screening.
//!
//! Components are standardised by the vector's own mean and standard
//! deviation. A constant vector (std ~ 0) has no distribution to test and
//! passes; non-finite components never pass.

use latent_align_core::{math, AlignError, LatentVector, RejectionReason, Result};
use statrs::distribution::{ContinuousCDF, Normal};

/// Standard deviations at or below this are treated as a constant vector.
const CONSTANT_STD: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct StatisticalThresholds {
    pub ks: f64,
    pub z_score: f64,
    pub ks_min_dimension: usize,
}

/// Outcome of the statistical stage with the measured statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct StatisticalOutcome {
    pub verdict: std::result::Result<(), RejectionReason>,
    pub ks_statistic: Option<f64>,
    pub max_abs_z: Option<f64>,
}

#[derive(Debug, Clone)]
pub(crate) struct StatisticalCheck {
    reference: Normal,
}

impl StatisticalCheck {
    pub fn new() -> Result<Self> {
        let reference = Normal::new(0.0, 1.0)
            .map_err(|e| AlignError::internal(format!("standard normal: {}", e)))?;
        Ok(Self { reference })
    }

    pub fn run(&self, vector: &LatentVector, thresholds: StatisticalThresholds) -> StatisticalOutcome {
        if vector.first_non_finite().is_some() {
            return StatisticalOutcome {
                verdict: Err(RejectionReason::NonFinite),
                ks_statistic: None,
                max_abs_z: None,
            };
        }

        let components = vector.components();
        let (mean, std) = math::mean_std(components);
        if std <= CONSTANT_STD {
            return StatisticalOutcome {
                verdict: Ok(()),
                ks_statistic: None,
                max_abs_z: None,
            };
        }

        let mut z: Vec<f64> = components
            .iter()
            .map(|&x| (f64::from(x) - mean) / std)
            .collect();

        let ks_statistic = if z.len() >= thresholds.ks_min_dimension {
            Some(self.ks_statistic(&mut z))
        } else {
            None
        };
        let max_abs_z = z.iter().fold(0.0f64, |m, v| m.max(v.abs()));

        let verdict = if ks_statistic.is_some_and(|d| d > thresholds.ks) {
            Err(RejectionReason::DistributionShift)
        } else if max_abs_z > thresholds.z_score {
            Err(RejectionReason::Outlier)
        } else {
            Ok(())
        };

        StatisticalOutcome {
            verdict,
            ks_statistic,
            max_abs_z: Some(max_abs_z),
        }
    }

    /// One-sample Kolmogorov–Smirnov statistic against N(0, 1). Sorts `z`.
    fn ks_statistic(&self, z: &mut [f64]) -> f64 {
        z.sort_by(|a, b| a.total_cmp(b));
        let n = z.len() as f64;
        z.iter().enumerate().fold(0.0f64, |d, (i, &x)| {
            let cdf = self.reference.cdf(x);
            let below = cdf - i as f64 / n;
            let above = (i + 1) as f64 / n - cdf;
            d.max(below).max(above)
        })
    }
}
