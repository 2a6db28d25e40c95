//! Vector math shared across pipeline stages.
//!
//! All reductions accumulate in f64 so that long f32 vectors do not lose
//! precision in the sums.

/// Dot product. Panics in debug builds if lengths differ.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| f64::from(x) * f64::from(y))
        .sum()
}

#[inline]
pub fn l2_norm(a: &[f32]) -> f64 {
    a.iter().map(|&x| f64::from(x) * f64::from(x)).sum::<f64>().sqrt()
}

/// Cosine similarity in [-1, 1].
///
/// Returns `None` if the lengths differ or either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() {
        return None;
    }
    let na = l2_norm(a);
    let nb = l2_norm(b);
    if na == 0.0 || nb == 0.0 {
        return None;
    }
    Some((dot(a, b) / (na * nb)).clamp(-1.0, 1.0))
}

/// Euclidean distance. `None` if the lengths differ.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() {
        return None;
    }
    Some(squared_distance(a, b).sqrt())
}

/// Squared Euclidean distance. Panics in debug builds if lengths differ.
#[inline]
pub fn squared_distance(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = f64::from(x) - f64::from(y);
            d * d
        })
        .sum()
}

/// Mean and population standard deviation. `(0, 0)` for an empty slice.
pub fn mean_std(values: &[f32]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let var = values
        .iter()
        .map(|&v| {
            let d = f64::from(v) - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    (mean, var.sqrt())
}

/// Project `v` to `target_dim` by truncating or zero-padding.
///
/// This is the naive, uncorrected mapping between latent spaces that an
/// alignment matrix is compared against.
pub fn naive_projection(v: &[f32], target_dim: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; target_dim];
    let n = v.len().min(target_dim);
    out[..n].copy_from_slice(&v[..n]);
    out
}
