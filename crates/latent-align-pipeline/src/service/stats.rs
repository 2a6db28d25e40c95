//! Service counters.

use std::sync::atomic::{AtomicU64, Ordering};

use latent_align_core::{AlignError, FirewallStage};
use serde::{Deserialize, Serialize};

/// Lock-free counters updated on every call.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    align_calls: AtomicU64,
    align_success: AtomicU64,
    validate_calls: AtomicU64,
    rejected_statistical: AtomicU64,
    rejected_adversarial: AtomicU64,
    rejected_semantic: AtomicU64,
    not_found: AtomicU64,
    budget_exceeded: AtomicU64,
    computations: AtomicU64,
}

impl StatsCounters {
    pub fn align_started(&self) {
        self.align_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn align_succeeded(&self) {
        self.align_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn validate_called(&self) {
        self.validate_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn computed(&self) {
        self.computations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejected(&self, stage: FirewallStage) {
        let counter = match stage {
            FirewallStage::Statistical => &self.rejected_statistical,
            FirewallStage::Adversarial => &self.rejected_adversarial,
            FirewallStage::Semantic => &self.rejected_semantic,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, err: &AlignError) {
        match err {
            AlignError::FirewallRejection { stage, .. } => self.rejected(*stage),
            AlignError::AlignmentNotFound { .. } => {
                self.not_found.fetch_add(1, Ordering::Relaxed);
            }
            AlignError::BudgetExceeded { .. } => {
                self.budget_exceeded.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn snapshot(&self) -> ServiceStats {
        ServiceStats {
            align_calls: self.align_calls.load(Ordering::Relaxed),
            align_success: self.align_success.load(Ordering::Relaxed),
            validate_calls: self.validate_calls.load(Ordering::Relaxed),
            rejected_statistical: self.rejected_statistical.load(Ordering::Relaxed),
            rejected_adversarial: self.rejected_adversarial.load(Ordering::Relaxed),
            rejected_semantic: self.rejected_semantic.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            budget_exceeded: self.budget_exceeded.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the service counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStats {
    pub align_calls: u64,
    pub align_success: u64,
    pub validate_calls: u64,
    pub rejected_statistical: u64,
    pub rejected_adversarial: u64,
    pub rejected_semantic: u64,
    pub not_found: u64,
    pub budget_exceeded: u64,
    /// On-demand alignment computations actually run.
    pub computations: u64,
}

impl ServiceStats {
    pub fn total_rejections(&self) -> u64 {
        self.rejected_statistical + self.rejected_adversarial + self.rejected_semantic
    }
}
