//! Ridge-regression solver and matrix application.

use std::sync::atomic::{AtomicU64, Ordering};

use latent_align_core::error::VectorError;
use latent_align_core::{
    ActivationBatch, AlignError, AlignmentMatrix, LatentVector, ModelId, QualityMetrics, Result,
};
use nalgebra::DMatrix;
use tracing::{debug, error, info, warn};

use super::evaluation::{evaluate_alignment, AlignmentEvaluation};

/// Raw ridge solution before it is wrapped as an [`AlignmentMatrix`].
#[derive(Debug, Clone)]
pub struct RidgeSolution {
    /// `d_A x d_B` weights.
    pub weights: DMatrix<f64>,
    pub lambda: f64,
}

impl RidgeSolution {
    /// Row-major f32 weights in the layout [`AlignmentMatrix`] expects.
    pub fn row_major_f32(&self) -> Result<Vec<f32>> {
        let (rows, cols) = self.weights.shape();
        let mut out = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                let w = self.weights[(i, j)] as f32;
                if !w.is_finite() {
                    return Err(AlignError::SingularMatrix {
                        dim: rows,
                        lambda: self.lambda,
                    });
                }
                out.push(w);
            }
        }
        Ok(out)
    }
}

/// Low-rank correction fitted to the residual of a ridge solution.
#[derive(Debug, Clone)]
pub struct ResidualCorrection {
    /// `d_A x d_B` correction, already truncated to `rank`.
    pub weights: DMatrix<f64>,
    pub rank: usize,
    /// Mean squared row error of the uncorrected solution.
    pub base_loss: f64,
    /// Mean squared row error once the correction is added.
    pub corrected_loss: f64,
}

/// Fits and applies alignment matrices.
///
/// Holds no state besides an invocation counter and the residual
/// correction rank, so one instance can be shared across every request.
#[derive(Debug, Default)]
pub struct AlignmentMatrixComputer {
    invocations: AtomicU64,
    correction_rank: usize,
}

impl AlignmentMatrixComputer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a rank-`rank` residual correction into every computed matrix.
    /// 0 keeps the plain ridge solution.
    pub fn with_correction_rank(mut self, rank: usize) -> Self {
        self.correction_rank = rank;
        self
    }

    pub fn correction_rank(&self) -> usize {
        self.correction_rank
    }

    /// Number of `compute_alignment` calls so far.
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    /// Solve the ridge problem for paired activations.
    ///
    /// # Errors
    /// - `AlignError::Validation` if `lambda` is not finite and > 0
    /// - `AlignError::InvalidVector` if the batches have different row counts
    /// - `AlignError::SingularMatrix` if the Gram matrix cannot be factorised
    ///   or the solution is not finite
    pub fn solve(
        &self,
        source: &ActivationBatch,
        target: &ActivationBatch,
        lambda: f64,
    ) -> Result<RidgeSolution> {
        check_pair(source, target, lambda)?;

        let d_a = source.cols();
        let weights = ridge(&to_dmatrix(source), &to_dmatrix(target), lambda)?;

        if source.rows() < d_a {
            debug!(
                target: "alignment::ridge",
                rows = source.rows(),
                dim = d_a,
                "Fewer anchors than source dimensions; relying on regularisation"
            );
        }
        Ok(RidgeSolution { weights, lambda })
    }

    /// Fit a rank-`rank` correction to the residual `H_B - H_A·W`.
    ///
    /// The residual map is solved with the same ridge problem as `base`,
    /// then truncated to its `rank` largest singular directions. Returns
    /// `None` when `rank` is 0 or the truncated correction does not lower
    /// the training loss.
    ///
    /// # Errors
    /// Same as [`solve`](Self::solve), plus `AlignError::Internal` if the
    /// SVD does not produce singular vectors.
    pub fn residual_correction(
        &self,
        source: &ActivationBatch,
        target: &ActivationBatch,
        base: &RidgeSolution,
        rank: usize,
    ) -> Result<Option<ResidualCorrection>> {
        if rank == 0 {
            return Ok(None);
        }
        check_pair(source, target, base.lambda)?;
        let ha = to_dmatrix(source);
        let hb = to_dmatrix(target);
        if base.weights.shape() != (ha.ncols(), hb.ncols()) {
            return Err(VectorError::DimensionMismatch {
                expected: ha.ncols(),
                actual: base.weights.nrows(),
            }
            .into());
        }

        let residual = &hb - &ha * &base.weights;
        let full = ridge(&ha, &residual, base.lambda)?;

        let svd = full.svd(true, true);
        let (u, v_t) = match (svd.u, svd.v_t) {
            (Some(u), Some(v_t)) => (u, v_t),
            _ => return Err(AlignError::internal("residual SVD returned no singular vectors")),
        };
        let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
        order.sort_by(|a, b| {
            svd.singular_values[*b]
                .partial_cmp(&svd.singular_values[*a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let k = rank.min(order.len());

        let mut weights = DMatrix::<f64>::zeros(ha.ncols(), hb.ncols());
        for &i in &order[..k] {
            weights += u.column(i) * v_t.row(i) * svd.singular_values[i];
        }

        let base_loss = mean_squared_error(&ha, &base.weights, &hb);
        let corrected_loss = mean_squared_error(&ha, &(&base.weights + &weights), &hb);
        debug!(
            target: "alignment::ridge",
            rank = k,
            base_loss,
            corrected_loss,
            "Fitted residual correction"
        );
        if !corrected_loss.is_finite() || corrected_loss >= base_loss {
            return Ok(None);
        }
        Ok(Some(ResidualCorrection {
            weights,
            rank: k,
            base_loss,
            corrected_loss,
        }))
    }

    /// Fit, evaluate and package an alignment matrix for a model pair.
    ///
    /// The ridge solution gets the configured residual correction when it
    /// lowers the training loss. The returned matrix carries the evaluated
    /// metrics, the lambda used and the training-set hash. It is not
    /// registered anywhere.
    pub fn compute_alignment(
        &self,
        source_model: &ModelId,
        target_model: &ModelId,
        source: &ActivationBatch,
        target: &ActivationBatch,
        lambda: f64,
    ) -> Result<(AlignmentMatrix, AlignmentEvaluation)> {
        self.invocations.fetch_add(1, Ordering::Relaxed);

        let base = self.solve(source, target, lambda)?;
        let correction = self.residual_correction(source, target, &base, self.correction_rank)?;
        let solution = match &correction {
            Some(c) => RidgeSolution {
                weights: &base.weights + &c.weights,
                lambda,
            },
            None => base,
        };

        let mut evaluation = evaluate_alignment(&solution.weights, source, target)?;
        if let Some(c) = &correction {
            evaluation.base_loss = c.base_loss;
            evaluation.correction_rank = c.rank;
        }
        let metrics: QualityMetrics = evaluation.quality_metrics()?;

        let matrix = AlignmentMatrix::new(
            source_model.clone(),
            target_model.clone(),
            source.cols(),
            target.cols(),
            solution.row_major_f32()?,
            metrics,
        )?
        .with_lambda(lambda)
        .with_training_set_hash(ActivationBatch::pair_hash(source, target));

        info!(
            target: "alignment::ridge",
            source = %source_model,
            target_model = %target_model,
            rows = source.rows(),
            source_dim = source.cols(),
            target_dim = target.cols(),
            cosine = evaluation.cosine_similarity,
            fidelity = evaluation.fidelity_score,
            correction_rank = evaluation.correction_rank,
            improvement_pct = evaluation.improvement_pct(),
            "Computed alignment matrix"
        );
        Ok((matrix, evaluation))
    }

    /// `y = x · W`.
    ///
    /// # Errors
    /// - `VectorError::DimensionMismatch` if `vector.dimension() != W.source_dim`
    /// - `VectorError::NonFinite` if the vector has NaN/Inf components, or
    ///   if a product overflows f32
    pub fn apply_alignment(
        &self,
        vector: &LatentVector,
        matrix: &AlignmentMatrix,
    ) -> Result<LatentVector> {
        vector.check_dimension(matrix.source_dim())?;
        vector.check_finite()?;

        let d_b = matrix.target_dim();
        let weights = matrix.weights();
        let mut acc = vec![0.0f64; d_b];
        for (x, row) in vector.components().iter().zip(weights.chunks_exact(d_b)) {
            if *x == 0.0 {
                continue;
            }
            let x = f64::from(*x);
            for (a, w) in acc.iter_mut().zip(row) {
                *a += x * f64::from(*w);
            }
        }
        let components = acc.into_iter().map(|v| v as f32).collect();
        let aligned = vector.derive(matrix.target_model.clone(), components)?;
        if let Err(e) = aligned.check_finite() {
            warn!(
                target: "alignment::apply",
                source = %vector.model_id(),
                source_dim = matrix.source_dim(),
                target_dim = d_b,
                "Aligned vector overflowed f32"
            );
            return Err(e.into());
        }
        Ok(aligned)
    }
}

fn check_pair(source: &ActivationBatch, target: &ActivationBatch, lambda: f64) -> Result<()> {
    if !lambda.is_finite() || lambda <= 0.0 {
        return Err(AlignError::validation(format!(
            "ridge lambda must be finite and > 0, got {}",
            lambda
        )));
    }
    if source.rows() != target.rows() {
        return Err(VectorError::InvalidBatch(format!(
            "paired batches differ in row count: {} vs {}",
            source.rows(),
            target.rows()
        ))
        .into());
    }
    Ok(())
}

/// `(H_AᵀH_A + λI)⁻¹ H_AᵀY` via Cholesky.
fn ridge(ha: &DMatrix<f64>, y: &DMatrix<f64>, lambda: f64) -> Result<DMatrix<f64>> {
    let d_a = ha.ncols();
    let gram = ha.tr_mul(ha) + DMatrix::<f64>::identity(d_a, d_a) * lambda;
    let rhs = ha.tr_mul(y);

    let cholesky = gram.cholesky().ok_or_else(|| {
        error!(
            target: "alignment::ridge",
            dim = d_a,
            lambda,
            "Gram matrix is not positive definite after regularisation"
        );
        AlignError::SingularMatrix { dim: d_a, lambda }
    })?;
    let weights = cholesky.solve(&rhs);

    if weights.iter().any(|w| !w.is_finite()) {
        error!(
            target: "alignment::ridge",
            dim = d_a,
            lambda,
            "Ridge solution contains non-finite weights"
        );
        return Err(AlignError::SingularMatrix { dim: d_a, lambda });
    }
    Ok(weights)
}

fn mean_squared_error(ha: &DMatrix<f64>, weights: &DMatrix<f64>, hb: &DMatrix<f64>) -> f64 {
    let rows = ha.nrows().max(1) as f64;
    (ha * weights - hb).norm_squared() / rows
}

pub(crate) fn to_dmatrix(batch: &ActivationBatch) -> DMatrix<f64> {
    let cols = batch.cols();
    let data = batch.data();
    DMatrix::from_fn(batch.rows(), cols, |i, j| f64::from(data[i * cols + j]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, StandardNormal};

    fn random_batch(rng: &mut ChaCha8Rng, rows: usize, cols: usize) -> ActivationBatch {
        let data = (0..rows * cols)
            .map(|_| -> f32 { StandardNormal.sample(&mut *rng) })
            .collect();
        ActivationBatch::new(rows, cols, data).unwrap()
    }

    /// Target = source · M for a known M.
    fn linear_target(source: &ActivationBatch, m: &[f32], d_b: usize) -> ActivationBatch {
        let d_a = source.cols();
        let mut data = Vec::with_capacity(source.rows() * d_b);
        for row in source.iter_rows() {
            for j in 0..d_b {
                let mut acc = 0.0f32;
                for i in 0..d_a {
                    acc += row[i] * m[i * d_b + j];
                }
                data.push(acc);
            }
        }
        ActivationBatch::new(source.rows(), d_b, data).unwrap()
    }

    #[test]
    fn test_recovers_known_linear_map() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let (d_a, d_b) = (6, 4);
        let m: Vec<f32> = (0..d_a * d_b).map(|k| (k as f32 * 0.37).sin()).collect();
        let source = random_batch(&mut rng, 200, d_a);
        let target = linear_target(&source, &m, d_b);

        let computer = AlignmentMatrixComputer::new();
        let solution = computer.solve(&source, &target, 1e-6).unwrap();
        let recovered = solution.row_major_f32().unwrap();
        let max_err = recovered
            .iter()
            .zip(&m)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        println!("AFTER: max weight error = {:.2e}", max_err);
        assert!(max_err < 1e-3);
    }

    #[test]
    fn test_lambda_must_be_positive() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let a = random_batch(&mut rng, 10, 3);
        let b = random_batch(&mut rng, 10, 2);
        let computer = AlignmentMatrixComputer::new();
        for lambda in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                computer.solve(&a, &b, lambda),
                Err(AlignError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_row_mismatch_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let a = random_batch(&mut rng, 10, 3);
        let b = random_batch(&mut rng, 9, 2);
        let err = AlignmentMatrixComputer::new().solve(&a, &b, 0.1).unwrap_err();
        assert_eq!(err.kind(), "invalid_vector");
    }

    #[test]
    fn test_rank_deficient_batch_is_solved_by_regularisation() {
        // All-zero source makes the Gram matrix exactly lambda * I.
        let a = ActivationBatch::new(4, 5, vec![0.0; 20]).unwrap();
        let b = ActivationBatch::new(4, 3, vec![1.0; 12]).unwrap();
        let solution = AlignmentMatrixComputer::new().solve(&a, &b, 0.5).unwrap();
        assert!(solution.weights.iter().all(|w| *w == 0.0));
    }

    #[test]
    fn test_compute_counts_invocations_and_records_provenance() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let source = random_batch(&mut rng, 64, 8);
        let m: Vec<f32> = (0..8 * 5).map(|k| ((k * 7 % 11) as f32 - 5.0) / 5.0).collect();
        let target = linear_target(&source, &m, 5);
        let computer = AlignmentMatrixComputer::new();
        let (matrix, eval) = computer
            .compute_alignment(
                &ModelId::new("a").unwrap(),
                &ModelId::new("b").unwrap(),
                &source,
                &target,
                1e-4,
            )
            .unwrap();
        assert_eq!(computer.invocations(), 1);
        assert_eq!((matrix.source_dim(), matrix.target_dim()), (8, 5));
        assert_eq!(matrix.lambda, 1e-4);
        assert_eq!(
            matrix.training_set_hash,
            Some(ActivationBatch::pair_hash(&source, &target))
        );
        assert!(eval.cosine_similarity > 0.999);
        assert_eq!(matrix.metrics.sample_count, 64);
    }

    #[test]
    fn test_apply_alignment_checks_dimension_and_maps_zero_to_zero() {
        let metrics = QualityMetrics::new(0.9, 0.1, 0.9, 10).unwrap();
        let matrix = AlignmentMatrix::new(
            ModelId::new("a").unwrap(),
            ModelId::new("b").unwrap(),
            3,
            2,
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            metrics,
        )
        .unwrap();
        let computer = AlignmentMatrixComputer::new();

        let x = LatentVector::new(ModelId::new("a").unwrap(), 4, vec![1.0, 0.0, -1.0]).unwrap();
        let y = computer.apply_alignment(&x, &matrix).unwrap();
        assert_eq!(y.components(), &[-4.0, -4.0]);
        assert_eq!(y.model_id().as_str(), "b");
        assert_eq!(y.layer_depth(), 4);

        let zero = LatentVector::new(ModelId::new("a").unwrap(), 1, vec![0.0; 3]).unwrap();
        assert!(computer.apply_alignment(&zero, &matrix).unwrap().is_zero());

        let wrong = LatentVector::new(ModelId::new("a").unwrap(), 1, vec![1.0; 4]).unwrap();
        assert!(computer.apply_alignment(&wrong, &matrix).is_err());
    }

    #[test]
    fn test_apply_alignment_rejects_overflowing_product() {
        let metrics = QualityMetrics::new(0.9, 0.1, 0.9, 10).unwrap();
        let matrix = AlignmentMatrix::new(
            ModelId::new("a").unwrap(),
            ModelId::new("b").unwrap(),
            2,
            2,
            vec![100.0; 4],
            metrics,
        )
        .unwrap();
        let x = LatentVector::new(ModelId::new("a").unwrap(), 1, vec![1e37, 2e37]).unwrap();
        x.check_finite().unwrap();

        let err = AlignmentMatrixComputer::new()
            .apply_alignment(&x, &matrix)
            .unwrap_err();
        println!("AFTER: {}", err);
        assert!(matches!(
            err,
            AlignError::InvalidVector(VectorError::NonFinite { .. })
        ));
    }

    fn shrunk_fit(rank: usize) -> (RidgeSolution, Option<ResidualCorrection>) {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let (d_a, d_b) = (6, 4);
        let m: Vec<f32> = (0..d_a * d_b).map(|k| (k as f32 * 0.61).cos()).collect();
        let source = random_batch(&mut rng, 48, d_a);
        let target = linear_target(&source, &m, d_b);
        // heavy regularisation leaves a large residual for the correction
        let computer = AlignmentMatrixComputer::new();
        let base = computer.solve(&source, &target, 40.0).unwrap();
        let correction = computer
            .residual_correction(&source, &target, &base, rank)
            .unwrap();
        (base, correction)
    }

    #[test]
    fn test_residual_correction_lowers_loss() {
        let (base, correction) = shrunk_fit(64);
        let correction = correction.expect("full-rank correction must help");
        println!(
            "BEFORE: loss = {:.4e}  AFTER: loss = {:.4e} (rank {})",
            correction.base_loss, correction.corrected_loss, correction.rank
        );
        assert_eq!(correction.rank, 4);
        assert_eq!(correction.weights.shape(), base.weights.shape());
        assert!(correction.corrected_loss < correction.base_loss);
    }

    #[test]
    fn test_residual_correction_truncates_rank() {
        let (_, correction) = shrunk_fit(1);
        if let Some(c) = correction {
            assert_eq!(c.rank, 1);
            assert!(c.corrected_loss < c.base_loss);
            let sv = c.weights.clone().singular_values();
            let significant = sv.iter().filter(|s| **s > 1e-9).count();
            assert_eq!(significant, 1);
        }
        let (_, none) = shrunk_fit(0);
        assert!(none.is_none());
    }

    #[test]
    fn test_compute_reports_correction_improvement() {
        let mut rng = ChaCha8Rng::seed_from_u64(22);
        let source = random_batch(&mut rng, 48, 6);
        let m: Vec<f32> = (0..6 * 4).map(|k| (k as f32 * 0.61).cos()).collect();
        let target = linear_target(&source, &m, 4);
        let (a, b) = (ModelId::new("a").unwrap(), ModelId::new("b").unwrap());

        let (_, plain) = AlignmentMatrixComputer::new()
            .compute_alignment(&a, &b, &source, &target, 40.0)
            .unwrap();
        assert_eq!(plain.correction_rank, 0);
        assert_eq!(plain.base_loss, plain.alignment_loss);

        let computer = AlignmentMatrixComputer::new().with_correction_rank(64);
        assert_eq!(computer.correction_rank(), 64);
        let (_, corrected) = computer
            .compute_alignment(&a, &b, &source, &target, 40.0)
            .unwrap();
        println!(
            "BEFORE: loss = {:.4e}  AFTER: loss = {:.4e}  improvement = {:.1}%",
            corrected.base_loss,
            corrected.alignment_loss,
            corrected.improvement_pct()
        );
        assert_eq!(corrected.correction_rank, 4);
        assert!(corrected.alignment_loss < corrected.base_loss);
        assert!(corrected.alignment_loss < plain.alignment_loss);
        assert!(corrected.improvement_pct() > 0.0);
    }
}
