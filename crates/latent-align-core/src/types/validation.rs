//! Firewall stage and rejection vocabulary shared with the error taxonomy.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the three sequential firewall checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirewallStage {
    Statistical,
    Adversarial,
    Semantic,
}

impl FirewallStage {
    /// Category string surfaced to callers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Statistical => "statistical",
            Self::Adversarial => "adversarial",
            Self::Semantic => "semantic",
        }
    }
}

impl fmt::Display for FirewallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse cause of a rejection.
///
/// Deliberately carries no scores or thresholds: callers learn which check
/// fired, not where the classifier's decision boundary sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// A component is NaN or infinite.
    NonFinite,
    /// Empirical distribution departs from Gaussian beyond the KS threshold.
    DistributionShift,
    /// A component's z-score exceeds the outlier threshold.
    Outlier,
    /// Adversarial classifier score above threshold.
    AdversarialScore,
    /// A decoded sample matched a known jailbreak/injection pattern.
    PatternMatch,
    /// A pluggable collaborator did not answer within its time budget.
    Timeout,
    /// A pluggable collaborator failed or returned an unusable answer.
    CollaboratorFault,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NonFinite => "non_finite",
            Self::DistributionShift => "distribution_shift",
            Self::Outlier => "outlier",
            Self::AdversarialScore => "adversarial_score",
            Self::PatternMatch => "pattern_match",
            Self::Timeout => "timeout",
            Self::CollaboratorFault => "collaborator_fault",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
