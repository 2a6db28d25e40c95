//! Registry records.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use latent_align_core::{AlignmentMatrix, CertificationTier, SemanticVersion};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a registered matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Eligible for lookup.
    Active,
    /// Superseded by a newer version at equal-or-better tier. Still listed.
    Retired,
}

/// One registered alignment matrix.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub id: Uuid,
    pub matrix: Arc<AlignmentMatrix>,
    pub tier: CertificationTier,
    pub status: EntryStatus,
    pub registered_at: DateTime<Utc>,
    /// Monotonic insertion order, breaks timestamp ties.
    pub(crate) sequence: u64,
}

impl RegistryEntry {
    #[inline]
    pub fn version(&self) -> SemanticVersion {
        self.matrix.version
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == EntryStatus::Active
    }

    /// Ordering used for "newest wins": version, then registration time.
    pub(crate) fn recency_key(&self) -> (SemanticVersion, DateTime<Utc>, u64) {
        (self.matrix.version, self.registered_at, self.sequence)
    }

    /// Whether `self` makes `other` obsolete.
    pub(crate) fn supersedes(&self, other: &RegistryEntry) -> bool {
        self.matrix.version > other.matrix.version && self.tier >= other.tier
    }
}

/// Result of a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: Uuid,
    pub tier: CertificationTier,
}
