//! Quality evaluation of a fitted alignment on its anchor set.
//!
//! | Metric | Definition |
//! |--------|------------|
//! | cosine_similarity | mean row cosine of `H_A·W` vs `H_B` |
//! | euclidean_distance | RMS per-component deviation |
//! | task_preservation | top-1 retrieval accuracy of aligned rows among target rows |
//! | alignment_loss (ε) | mean squared row error |
//! | fidelity_score | `1 / (1 + ε)` |
//! | information_retention | `exp(-KL)` between normalised singular-value spectra |

use latent_align_core::error::VectorError;
use latent_align_core::{math, ActivationBatch, QualityMetrics, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use super::computer::to_dmatrix;

/// Loss of the naive baseline that fidelity boosts are measured against.
pub const BASELINE_ALIGNMENT_LOSS: f64 = 0.1;

const SPECTRUM_FLOOR: f64 = 1e-12;

/// Full evaluation of an alignment matrix on paired anchors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentEvaluation {
    pub cosine_similarity: f64,
    pub euclidean_distance: f64,
    pub task_preservation: f64,
    pub alignment_loss: f64,
    pub fidelity_score: f64,
    pub information_retention: f64,
    pub sample_count: u64,
    /// Loss of the plain ridge fit, before any residual correction.
    pub base_loss: f64,
    /// Rank of the residual correction folded into the weights, 0 if none.
    pub correction_rank: usize,
}

impl AlignmentEvaluation {
    /// Project onto the metrics used for certification.
    pub fn quality_metrics(&self) -> Result<QualityMetrics> {
        Ok(QualityMetrics::new(
            self.cosine_similarity,
            self.euclidean_distance,
            self.task_preservation,
            self.sample_count,
        )?)
    }

    /// Percentage improvement over [`BASELINE_ALIGNMENT_LOSS`].
    pub fn fidelity_boost(&self) -> f64 {
        estimate_fidelity_boost(self.alignment_loss, BASELINE_ALIGNMENT_LOSS)
    }

    /// Loss reduction of the corrected fit relative to the plain ridge fit.
    pub fn improvement_pct(&self) -> f64 {
        estimate_fidelity_boost(self.alignment_loss, self.base_loss)
    }
}

/// Evaluate `weights` (`d_A x d_B`) on paired anchor batches.
///
/// # Errors
/// `VectorError::DimensionMismatch` / `InvalidBatch` if shapes disagree.
pub fn evaluate_alignment(
    weights: &DMatrix<f64>,
    source: &ActivationBatch,
    target: &ActivationBatch,
) -> Result<AlignmentEvaluation> {
    if weights.nrows() != source.cols() {
        return Err(VectorError::DimensionMismatch {
            expected: weights.nrows(),
            actual: source.cols(),
        }
        .into());
    }
    if weights.ncols() != target.cols() {
        return Err(VectorError::DimensionMismatch {
            expected: weights.ncols(),
            actual: target.cols(),
        }
        .into());
    }
    if source.rows() != target.rows() {
        return Err(VectorError::InvalidBatch(format!(
            "paired batches differ in row count: {} vs {}",
            source.rows(),
            target.rows()
        ))
        .into());
    }

    let ha = to_dmatrix(source);
    let aligned = &ha * weights;
    let rows = source.rows();
    let d_b = target.cols();

    let aligned_rows: Vec<Vec<f32>> = (0..rows)
        .map(|i| aligned.row(i).iter().map(|v| *v as f32).collect())
        .collect();

    let mut cosine_sum = 0.0;
    let mut squared_sum = 0.0;
    for (i, row) in aligned_rows.iter().enumerate() {
        let reference = target.row(i);
        cosine_sum += row_cosine(row, reference);
        squared_sum += math::squared_distance(row, reference);
    }
    let n = rows as f64;
    let alignment_loss = squared_sum / n;

    Ok(AlignmentEvaluation {
        cosine_similarity: (cosine_sum / n).clamp(-1.0, 1.0),
        euclidean_distance: (alignment_loss / d_b as f64).sqrt(),
        task_preservation: top1_retrieval(&aligned_rows, target),
        alignment_loss,
        fidelity_score: 1.0 / (1.0 + alignment_loss),
        information_retention: information_retention(&ha, &aligned),
        sample_count: rows as u64,
        base_loss: alignment_loss,
        correction_rank: 0,
    })
}

/// Percentage improvement of `loss` over `baseline_loss`, clamped to 0..=100.
pub fn estimate_fidelity_boost(loss: f64, baseline_loss: f64) -> f64 {
    if !baseline_loss.is_finite() || baseline_loss <= 0.0 || !loss.is_finite() {
        return 0.0;
    }
    ((baseline_loss - loss) / baseline_loss * 100.0).clamp(0.0, 100.0)
}

/// Two zero rows agree perfectly; one zero row against a non-zero one does not.
fn row_cosine(a: &[f32], b: &[f32]) -> f64 {
    match math::cosine_similarity(a, b) {
        Some(c) => c,
        None if math::l2_norm(a) == 0.0 && math::l2_norm(b) == 0.0 => 1.0,
        None => 0.0,
    }
}

fn top1_retrieval(aligned: &[Vec<f32>], target: &ActivationBatch) -> f64 {
    if aligned.is_empty() {
        return 0.0;
    }
    let hits = aligned
        .iter()
        .enumerate()
        .filter(|(i, row)| {
            let mut best = (usize::MAX, f64::NEG_INFINITY);
            for (j, candidate) in target.iter_rows().enumerate() {
                let score = row_cosine(row, candidate);
                if score > best.1 {
                    best = (j, score);
                }
            }
            best.0 == *i
        })
        .count();
    hits as f64 / aligned.len() as f64
}

fn information_retention(source: &DMatrix<f64>, aligned: &DMatrix<f64>) -> f64 {
    let p = normalised_spectrum(source);
    let q = normalised_spectrum(aligned);
    let k = p.len().min(q.len());
    if k == 0 {
        return 0.0;
    }
    let p = renormalise(&p[..k]);
    let q = renormalise(&q[..k]);
    let kl: f64 = p
        .iter()
        .zip(&q)
        .map(|(pi, qi)| {
            let pi = pi.max(SPECTRUM_FLOOR);
            let qi = qi.max(SPECTRUM_FLOOR);
            pi * (pi / qi).ln()
        })
        .sum();
    (-kl.max(0.0)).exp()
}

fn normalised_spectrum(m: &DMatrix<f64>) -> Vec<f64> {
    let mut values: Vec<f64> = m.clone().singular_values().iter().copied().collect();
    values.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    renormalise(&values)
}

fn renormalise(values: &[f64]) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return vec![1.0 / values.len().max(1) as f64; values.len()];
    }
    values.iter().map(|v| v / total).collect()
}
