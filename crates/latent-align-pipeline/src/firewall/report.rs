//! Firewall state machine and validation reports.

use std::fmt;

use latent_align_core::{FirewallStage, RejectionReason};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `Pending -> Statistical -> Adversarial -> Semantic -> Accepted`, with
/// every stage able to move straight to `Rejected`. Terminal states are
/// never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum FirewallState {
    Pending,
    Statistical,
    Adversarial,
    Semantic,
    Accepted,
    Rejected {
        stage: FirewallStage,
        reason: RejectionReason,
    },
}

impl FirewallState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected { .. })
    }

    /// Advance after the current stage passed.
    pub fn advance(self) -> Self {
        match self {
            Self::Pending => Self::Statistical,
            Self::Statistical => Self::Adversarial,
            Self::Adversarial => Self::Semantic,
            Self::Semantic => Self::Accepted,
            terminal => terminal,
        }
    }

    /// Reject at the current stage. No-op on terminal states.
    pub fn reject(self, reason: RejectionReason) -> Self {
        match self.stage() {
            Some(stage) => Self::Rejected { stage, reason },
            None => self,
        }
    }

    /// The stage being evaluated, if any.
    pub fn stage(&self) -> Option<FirewallStage> {
        match self {
            Self::Statistical => Some(FirewallStage::Statistical),
            Self::Adversarial => Some(FirewallStage::Adversarial),
            Self::Semantic => Some(FirewallStage::Semantic),
            _ => None,
        }
    }
}

impl fmt::Display for FirewallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Statistical => f.write_str("statistical"),
            Self::Adversarial => f.write_str("adversarial"),
            Self::Semantic => f.write_str("semantic"),
            Self::Accepted => f.write_str("accepted"),
            Self::Rejected { stage, reason } => write!(f, "rejected({}: {})", stage, reason),
        }
    }
}

/// Diagnostic result of running every firewall stage on one vector.
///
/// Ephemeral: produced per call and only persisted through the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub request_id: Uuid,
    pub is_valid: bool,
    pub statistical_pass: bool,
    /// `None` when stage 2 did not run or produced no usable score.
    pub adversarial_score: Option<f64>,
    /// `None` when stage 3 did not run.
    pub semantic_pass: Option<bool>,
    /// First failing stage in pipeline order.
    pub rejection_reason: Option<FirewallStage>,
    /// Coarse cause of that failure.
    pub rejection_cause: Option<RejectionReason>,
    pub strict_mode: bool,
    pub state: FirewallState,
}
