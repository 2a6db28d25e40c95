//! Gaussian mechanism calibration.

use latent_align_core::{AlignError, Result};

/// `sigma = sqrt(2 ln(1.25 / delta)) / epsilon`.
///
/// # Errors
/// `AlignError::Validation` unless `epsilon > 0` and `0 < delta < 1`, or if
/// the resulting sigma cannot be represented in f32 noise.
pub fn gaussian_sigma(epsilon: f64, delta: f64) -> Result<f64> {
    validate_parameters(epsilon, delta)?;
    let sigma = (2.0 * (1.25 / delta).ln()).sqrt() / epsilon;
    if !sigma.is_finite() || sigma > f64::from(f32::MAX) {
        return Err(AlignError::validation(format!(
            "epsilon {} with delta {} needs sigma {:e}, beyond f32 range",
            epsilon, delta, sigma
        )));
    }
    Ok(sigma)
}

pub(crate) fn validate_parameters(epsilon: f64, delta: f64) -> Result<()> {
    if !epsilon.is_finite() || epsilon <= 0.0 {
        return Err(AlignError::validation(format!(
            "epsilon must be finite and > 0, got {}",
            epsilon
        )));
    }
    if !(delta > 0.0 && delta < 1.0) {
        return Err(AlignError::validation(format!(
            "delta must be in (0, 1), got {}",
            delta
        )));
    }
    Ok(())
}
