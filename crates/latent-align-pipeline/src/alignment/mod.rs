//! Alignment matrix computation.
//!
//! `W* = (H_Aᵀ H_A + λI)⁻¹ H_Aᵀ H_B`, solved by Cholesky factorisation of
//! the regularised Gram matrix, optionally followed by a rank-k correction
//! fitted to the residual. Results are pure; caching across requests is
//! done by [`SingleFlightCache`] at the orchestrator.

mod cache;
mod computer;
mod evaluation;

pub use cache::{AlignmentCacheKey, SingleFlightCache};
pub use computer::{AlignmentMatrixComputer, ResidualCorrection, RidgeSolution};
pub use evaluation::{
    estimate_fidelity_boost, evaluate_alignment, AlignmentEvaluation, BASELINE_ALIGNMENT_LOSS,
};
