//! Top-level unified error type.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::sub_errors::{ConfigError, RegistryError, VectorError};
use crate::types::{CertificationTier, FirewallStage, ModelPair, RejectionReason};

/// Top-level error for every pipeline operation.
///
/// # Recoverability
///
/// - Recoverable (caller can adjust and resubmit): invalid vectors,
///   firewall rejections, missing alignments, exhausted budgets
/// - Critical (needs operator attention): singular matrices, timeouts,
///   internal invariant violations
///
/// Nothing is ever retried automatically.
#[derive(Debug, Error)]
pub enum AlignError {
    /// Non-finite values, dimension mismatch, malformed packet.
    #[error("Invalid vector: {0}")]
    InvalidVector(#[from] VectorError),

    /// The firewall refused the vector. Only the stage category and a
    /// coarse reason are exposed.
    #[error("Firewall rejected {} vector at {stage} stage ({reason})", origin_label(.transformed))]
    FirewallRejection {
        stage: FirewallStage,
        reason: RejectionReason,
        /// True when the rejection happened on the aligned output rather than the input.
        transformed: bool,
    },

    /// No certified matrix exists for the pair at the requested tier.
    #[error("No alignment for {pair} at tier >= {min_tier}")]
    AlignmentNotFound {
        pair: ModelPair,
        min_tier: CertificationTier,
    },

    /// Ridge regression could not invert the regularised Gram matrix.
    #[error("Singular {dim}x{dim} Gram matrix after ridge regularisation (lambda={lambda})")]
    SingularMatrix { dim: usize, lambda: f64 },

    /// Privacy budget exhausted for this accounting window.
    #[error("Privacy budget exceeded for '{identity}': requested epsilon {requested}, remaining {remaining}, window resets at {resets_at}")]
    BudgetExceeded {
        identity: String,
        requested: f64,
        remaining: f64,
        resets_at: DateTime<Utc>,
    },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A bounded operation exceeded its wall-clock budget.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// Caller-supplied parameter out of range (lambda, epsilon, delta, ...).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invariant violation; indicates a bug.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AlignError {
    /// Stable snake_case identifier of the error kind for the service boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidVector(_) => "invalid_vector",
            Self::FirewallRejection { .. } => "firewall_rejection",
            Self::AlignmentNotFound { .. } => "alignment_not_found",
            Self::SingularMatrix { .. } => "singular_matrix",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::Registry(_) => "registry",
            Self::Config(_) => "config",
            Self::Timeout { .. } => "timeout",
            Self::Validation(_) => "validation",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether a caller can succeed by resubmitting adjusted input
    /// (corrected vector, lower tier, later window).
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidVector(_)
                | Self::FirewallRejection { .. }
                | Self::AlignmentNotFound { .. }
                | Self::BudgetExceeded { .. }
                | Self::Validation(_)
        )
    }

    /// Whether this error indicates a system problem worth logging at ERROR.
    #[inline]
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::SingularMatrix { .. } | Self::Timeout { .. } | Self::Internal(_)
        )
    }

    /// Firewall stage that rejected the vector, if any.
    pub fn rejected_stage(&self) -> Option<FirewallStage> {
        match self {
            Self::FirewallRejection { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    #[inline]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    #[inline]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

fn origin_label(transformed: &bool) -> &'static str {
    if *transformed {
        "transformed"
    } else {
        "input"
    }
}

/// Result type alias for latent-align operations.
pub type Result<T> = std::result::Result<T, AlignError>;
