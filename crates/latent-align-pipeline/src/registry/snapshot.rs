//! JSON snapshots of the registry.

use chrono::{DateTime, Utc};
use latent_align_core::{AlignmentMatrix, CertificationTier};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entry::EntryStatus;

pub(crate) const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct RegistrySnapshot {
    pub format_version: u32,
    pub saved_at: DateTime<Utc>,
    pub entries: Vec<SnapshotRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SnapshotRecord {
    pub id: Uuid,
    pub tier: CertificationTier,
    pub status: EntryStatus,
    pub registered_at: DateTime<Utc>,
    pub matrix: AlignmentMatrix,
}
