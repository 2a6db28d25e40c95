//! Compatibility registry: versioned, certified alignment matrices.
//!
//! Read-heavy and append-mostly. A single `parking_lot::RwLock` guards the
//! tables; `register` takes the write lock for the whole check-and-insert,
//! so writers for the same pair and version are serialised and collisions
//! are rejected rather than overwritten.

mod entry;
mod snapshot;

pub use entry::{EntryStatus, Registration, RegistryEntry};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use latent_align_core::config::RegistryConfig;
use latent_align_core::error::RegistryError;
use latent_align_core::{
    AlignError, AlignmentMatrix, CertificationTier, ModelId, ModelPair, QualityMetrics, Result,
    SemanticVersion,
};
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use snapshot::{RegistrySnapshot, SnapshotRecord, SNAPSHOT_FORMAT_VERSION};

#[derive(Debug, Default)]
struct RegistryTables {
    by_id: HashMap<Uuid, RegistryEntry>,
    by_pair: HashMap<ModelPair, Vec<Uuid>>,
    next_sequence: u64,
}

impl RegistryTables {
    fn pair_entries(&self, pair: &ModelPair) -> impl Iterator<Item = &RegistryEntry> {
        self.by_pair
            .get(pair)
            .into_iter()
            .flatten()
            .filter_map(|id| self.by_id.get(id))
    }

    fn insert(&mut self, mut entry: RegistryEntry, retire_superseded: bool) -> Result<()> {
        let pair = entry.matrix.pair();
        if self
            .pair_entries(&pair)
            .any(|e| e.matrix.version == entry.matrix.version)
        {
            return Err(RegistryError::VersionConflict {
                pair: pair.to_string(),
                version: entry.matrix.version.to_string(),
            }
            .into());
        }

        entry.sequence = self.next_sequence;
        self.next_sequence += 1;

        if retire_superseded && entry.is_active() {
            if self
                .pair_entries(&pair)
                .any(|e| e.is_active() && e.supersedes(&entry))
            {
                entry.status = EntryStatus::Retired;
            }
            let retired: Vec<Uuid> = self
                .pair_entries(&pair)
                .filter(|e| e.is_active() && entry.supersedes(e))
                .map(|e| e.id)
                .collect();
            for id in retired {
                if let Some(old) = self.by_id.get_mut(&id) {
                    old.status = EntryStatus::Retired;
                    info!(
                        target: "registry",
                        pair = %pair,
                        retired = %old.matrix.version,
                        by = %entry.matrix.version,
                        "Retired superseded alignment matrix"
                    );
                }
            }
        }

        self.by_pair.entry(pair).or_default().push(entry.id);
        self.by_id.insert(entry.id, entry);
        Ok(())
    }
}

/// Stores, versions and certifies alignment matrices.
#[derive(Debug)]
pub struct CompatibilityRegistry {
    tables: RwLock<RegistryTables>,
    retire_superseded: bool,
}

impl Default for CompatibilityRegistry {
    fn default() -> Self {
        Self::new(&RegistryConfig::default())
    }
}

impl CompatibilityRegistry {
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            tables: RwLock::new(RegistryTables::default()),
            retire_superseded: config.retire_superseded,
        }
    }

    /// Register a matrix under its recorded metrics.
    ///
    /// # Errors
    /// - `RegistryError::InvalidMetrics` for out-of-range metrics
    /// - `RegistryError::BelowCertification` if the metrics miss bronze
    /// - `RegistryError::VersionConflict` if the pair already has this version
    pub fn register(&self, matrix: AlignmentMatrix) -> Result<Registration> {
        matrix.metrics.validate()?;
        let tier = CertificationTier::assign(&matrix.metrics).ok_or_else(|| {
            warn!(
                target: "registry",
                pair = %matrix.pair(),
                cosine = matrix.metrics.cosine_similarity,
                "Rejected matrix below bronze certification"
            );
            RegistryError::BelowCertification {
                cosine: matrix.metrics.cosine_similarity,
            }
        })?;

        let entry = RegistryEntry {
            id: Uuid::new_v4(),
            matrix: Arc::new(matrix),
            tier,
            status: EntryStatus::Active,
            registered_at: Utc::now(),
            sequence: 0,
        };
        let registration = Registration { id: entry.id, tier };
        let pair = entry.matrix.pair();
        let version = entry.matrix.version;

        self.tables.write().insert(entry, self.retire_superseded)?;

        info!(
            target: "registry",
            id = %registration.id,
            pair = %pair,
            version = %version,
            tier = %tier,
            "Registered alignment matrix"
        );
        Ok(registration)
    }

    /// Attach `metrics` to `matrix` and register it.
    pub fn register_compatibility(
        &self,
        matrix: AlignmentMatrix,
        metrics: QualityMetrics,
    ) -> Result<Registration> {
        self.register(matrix.with_metrics(metrics))
    }

    /// Best active matrix for the pair at or above `min_tier`.
    ///
    /// Highest semantic version wins; ties go to the latest registration.
    ///
    /// # Errors
    /// `AlignError::AlignmentNotFound` if nothing qualifies.
    pub fn lookup(
        &self,
        source: &ModelId,
        target: &ModelId,
        min_tier: CertificationTier,
    ) -> Result<RegistryEntry> {
        let pair = ModelPair::new(source.clone(), target.clone());
        let tables = self.tables.read();
        let best = tables
            .pair_entries(&pair)
            .filter(|e| e.is_active() && e.tier >= min_tier)
            .max_by_key(|e| e.recency_key())
            .cloned();
        drop(tables);

        match best {
            Some(entry) => {
                debug!(
                    target: "registry",
                    pair = %pair,
                    version = %entry.version(),
                    tier = %entry.tier,
                    "Lookup hit"
                );
                Ok(entry)
            }
            None => Err(AlignError::AlignmentNotFound { pair, min_tier }),
        }
    }

    /// Every version registered for the pair, highest version first.
    pub fn list_versions(&self, source: &ModelId, target: &ModelId) -> Vec<RegistryEntry> {
        let pair = ModelPair::new(source.clone(), target.clone());
        let mut entries: Vec<RegistryEntry> =
            self.tables.read().pair_entries(&pair).cloned().collect();
        entries.sort_by(|a, b| b.recency_key().cmp(&a.recency_key()));
        entries
    }

    /// Version a newly computed matrix for `pair` should take.
    pub fn next_version(&self, pair: &ModelPair) -> SemanticVersion {
        self.tables
            .read()
            .pair_entries(pair)
            .map(|e| e.matrix.version)
            .max()
            .map(SemanticVersion::bump_minor)
            .unwrap_or_default()
    }

    pub fn get(&self, id: &Uuid) -> Result<RegistryEntry> {
        self.tables
            .read()
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownMatrix(*id).into())
    }

    /// Model pairs with at least one registered matrix.
    pub fn pairs(&self) -> Vec<ModelPair> {
        let mut pairs: Vec<ModelPair> = self.tables.read().by_pair.keys().cloned().collect();
        pairs.sort();
        pairs
    }

    pub fn len(&self) -> usize {
        self.tables.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write every entry to a JSON file.
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let snapshot = {
            let tables = self.tables.read();
            let mut entries: Vec<&RegistryEntry> = tables.by_id.values().collect();
            entries.sort_by_key(|e| e.sequence);
            RegistrySnapshot {
                format_version: SNAPSHOT_FORMAT_VERSION,
                saved_at: Utc::now(),
                entries: entries
                    .into_iter()
                    .map(|e| SnapshotRecord {
                        id: e.id,
                        tier: e.tier,
                        status: e.status,
                        registered_at: e.registered_at,
                        matrix: (*e.matrix).clone(),
                    })
                    .collect(),
            }
        };
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| RegistryError::Snapshot(format!("serialize: {}", e)))?;
        std::fs::write(path, json).map_err(|e| {
            RegistryError::Snapshot(format!("write '{}': {}", path.display(), e))
        })?;
        info!(
            target: "registry",
            path = %path.display(),
            entries = snapshot.entries.len(),
            "Saved registry snapshot"
        );
        Ok(())
    }

    /// Load a registry from a JSON snapshot.
    ///
    /// Tiers are re-derived from the stored metrics; a snapshot whose
    /// recorded tier disagrees, or that repeats an id or a pair version, is
    /// rejected as a whole.
    pub fn load_snapshot(path: impl AsRef<Path>, config: &RegistryConfig) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            RegistryError::Snapshot(format!("read '{}': {}", path.display(), e))
        })?;
        let snapshot: RegistrySnapshot = serde_json::from_str(&json)
            .map_err(|e| RegistryError::Snapshot(format!("parse '{}': {}", path.display(), e)))?;
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(RegistryError::Snapshot(format!(
                "unsupported snapshot format {}",
                snapshot.format_version
            ))
            .into());
        }

        let mut tables = RegistryTables::default();
        for record in snapshot.entries {
            record.matrix.check_integrity()?;
            record.matrix.metrics.validate()?;
            let derived = CertificationTier::assign(&record.matrix.metrics);
            if derived != Some(record.tier) {
                return Err(RegistryError::Snapshot(format!(
                    "entry {} records tier {} but its metrics give {}",
                    record.id,
                    record.tier,
                    derived.map_or("none", |t| t.as_str())
                ))
                .into());
            }
            if tables.by_id.contains_key(&record.id) {
                return Err(
                    RegistryError::Snapshot(format!("duplicate entry id {}", record.id)).into(),
                );
            }
            let entry = RegistryEntry {
                id: record.id,
                matrix: Arc::new(record.matrix),
                tier: record.tier,
                status: record.status,
                registered_at: record.registered_at,
                sequence: 0,
            };
            // Stored statuses are authoritative; do not re-run retirement.
            tables.insert(entry, false)?;
        }

        info!(
            target: "registry",
            path = %path.display(),
            entries = tables.by_id.len(),
            "Loaded registry snapshot"
        );
        Ok(Self {
            tables: RwLock::new(tables),
            retire_superseded: config.retire_superseded,
        })
    }
}
