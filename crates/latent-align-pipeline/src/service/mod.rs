//! Alignment service: the pipeline's public operations.
//!
//! `align` runs, in order: firewall stages 1-2 on the input, matrix lookup
//! (or single-flight on-demand computation), the linear transform,
//! firewall stage 3 on the transformed vector, and finally the optional
//! privacy debit and noise. Any failure halts the pipeline and nothing
//! partial is returned or cached.

mod stats;
mod types;

pub use stats::ServiceStats;
pub use types::{AlignOptions, AlignOutcome, PrivacyOptions};

use std::sync::Arc;
use std::time::{Duration, Instant};

use latent_align_core::codec::{Packet, PacketSigner};
use latent_align_core::{
    math, AlignError, AlignmentMatrix, CertificationTier, LatentVector, ModelId, ModelPair,
    PipelineConfig, Precision, QualityMetrics, Result,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::alignment::{AlignmentCacheKey, AlignmentMatrixComputer, SingleFlightCache};
use crate::firewall::{LatentSpaceFirewall, ValidationReport};
use crate::privacy::{gaussian_sigma, PrivacyBudgetManager};
use crate::registry::{CompatibilityRegistry, Registration, RegistryEntry};
use crate::traits::{AdversarialClassifier, AnchorSet, AnchorSource, SampleDecoder};
use stats::StatsCounters;

/// Orchestrates firewall, registry, alignment and privacy.
pub struct AlignmentService {
    config: PipelineConfig,
    firewall: LatentSpaceFirewall,
    registry: Arc<CompatibilityRegistry>,
    computer: Arc<AlignmentMatrixComputer>,
    privacy: Arc<PrivacyBudgetManager>,
    anchors: Option<Arc<dyn AnchorSource>>,
    cache: SingleFlightCache,
    stats: StatsCounters,
}

impl AlignmentService {
    /// Build a service with its own registry and privacy manager.
    ///
    /// # Errors
    /// `AlignError::Config` if `config` fails validation.
    pub fn new(
        config: PipelineConfig,
        classifier: Arc<dyn AdversarialClassifier>,
        decoder: Arc<dyn SampleDecoder>,
    ) -> Result<Self> {
        config.validate()?;
        let firewall = LatentSpaceFirewall::new(config.firewall.clone(), classifier, decoder)?;
        let registry = Arc::new(CompatibilityRegistry::new(&config.registry));
        let privacy = Arc::new(PrivacyBudgetManager::new(&config.privacy)?);
        info!(
            target: "service",
            min_tier = %config.alignment.default_min_tier,
            compute_on_demand = config.alignment.compute_on_demand,
            "Alignment service initialised"
        );
        let computer = Arc::new(
            AlignmentMatrixComputer::new().with_correction_rank(config.alignment.correction_rank),
        );
        Ok(Self {
            config,
            firewall,
            registry,
            computer,
            privacy,
            anchors: None,
            cache: SingleFlightCache::new(),
            stats: StatsCounters::default(),
        })
    }

    /// Share an existing registry (e.g. one loaded from a snapshot).
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<CompatibilityRegistry>) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn with_privacy_manager(mut self, privacy: Arc<PrivacyBudgetManager>) -> Self {
        self.privacy = privacy;
        self
    }

    /// Enable on-demand alignment from anchor activations.
    #[must_use]
    pub fn with_anchor_source(mut self, anchors: Arc<dyn AnchorSource>) -> Self {
        self.anchors = Some(anchors);
        self
    }

    pub fn registry(&self) -> &Arc<CompatibilityRegistry> {
        &self.registry
    }

    pub fn privacy(&self) -> &Arc<PrivacyBudgetManager> {
        &self.privacy
    }

    pub fn computer(&self) -> &Arc<AlignmentMatrixComputer> {
        &self.computer
    }

    pub fn firewall(&self) -> &LatentSpaceFirewall {
        &self.firewall
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stats(&self) -> ServiceStats {
        self.stats.snapshot()
    }

    /// Transform `vector` from `source`'s latent space into `target`'s.
    ///
    /// # Errors
    /// - `AlignError::Validation` if the vector is not tagged with `source`
    ///   or the privacy parameters are out of range
    /// - `AlignError::FirewallRejection` from the input or transformed checks
    /// - `AlignError::AlignmentNotFound` if no matrix meets the minimum tier
    /// - `AlignError::InvalidVector` on dimension mismatch
    /// - `AlignError::BudgetExceeded` if privacy was requested and unaffordable
    /// - `AlignError::Timeout` / `SingularMatrix` from on-demand computation
    pub async fn align(
        &self,
        vector: &LatentVector,
        source: &ModelId,
        target: &ModelId,
        options: AlignOptions,
    ) -> Result<AlignOutcome> {
        self.stats.align_started();
        let started = Instant::now();
        let request_id = options.request_id.unwrap_or_else(Uuid::new_v4);

        let result = self
            .run_align(vector, source, target, &options, request_id, started)
            .await;
        match &result {
            Ok(outcome) => {
                self.stats.align_succeeded();
                info!(
                    target: "service",
                    request_id = %request_id,
                    source = %source,
                    target_model = %target,
                    version = %outcome.matrix_version,
                    tier = %outcome.tier,
                    elapsed_ms = outcome.processing_time_ms,
                    "Align completed"
                );
            }
            Err(e) => {
                self.stats.record_error(e);
                if e.is_critical() {
                    error!(target: "service", request_id = %request_id, error = %e, "Align failed");
                } else {
                    warn!(target: "service", request_id = %request_id, kind = e.kind(), error = %e, "Align failed");
                }
            }
        }
        result
    }

    async fn run_align(
        &self,
        vector: &LatentVector,
        source: &ModelId,
        target: &ModelId,
        options: &AlignOptions,
        request_id: Uuid,
        started: Instant,
    ) -> Result<AlignOutcome> {
        if vector.model_id() != source {
            return Err(AlignError::validation(format!(
                "vector belongs to '{}', not source model '{}'",
                vector.model_id(),
                source
            )));
        }
        if let Some(privacy) = &options.privacy {
            gaussian_sigma(privacy.epsilon, privacy.delta)?;
        }
        let min_tier = options
            .min_tier
            .unwrap_or(self.config.alignment.default_min_tier);

        // 1. Input firewall.
        self.firewall
            .check_input(vector, options.strict_mode, request_id)
            .await?;

        // 2. Matrix.
        let pair = ModelPair::new(source.clone(), target.clone());
        let entry = self.resolve_matrix(&pair, min_tier).await?;
        let matrix = &entry.matrix;

        // 3. Transform.
        let aligned = self.computer.apply_alignment(vector, matrix)?;
        debug!(
            target: "service",
            request_id = %request_id,
            source_dim = matrix.source_dim(),
            target_dim = matrix.target_dim(),
            "Applied alignment"
        );

        // 4. Transformed firewall.
        self.firewall.check_transformed(&aligned, request_id).await?;

        let naive = math::naive_projection(vector.components(), matrix.target_dim());
        let naive_agreement = math::cosine_similarity(aligned.components(), &naive);

        // 5. Privacy. Synchronous from here on.
        let (aligned_vector, receipt) = match &options.privacy {
            Some(p) => {
                let (noised, receipt) =
                    self.privacy
                        .inject_privacy(&aligned, p.epsilon, p.delta, &p.identity)?;
                (noised, Some(receipt))
            }
            None => (aligned, None),
        };

        Ok(AlignOutcome {
            request_id,
            aligned_vector,
            source_model: source.clone(),
            confidence: matrix.metrics.cosine_similarity,
            naive_agreement,
            matrix_id: entry.id,
            matrix_version: matrix.version,
            tier: entry.tier,
            processing_time_ms: started.elapsed().as_millis() as u64,
            privacy: receipt,
        })
    }

    /// Registry lookup, falling back to single-flight computation from
    /// anchor data.
    async fn resolve_matrix(
        &self,
        pair: &ModelPair,
        min_tier: CertificationTier,
    ) -> Result<RegistryEntry> {
        let not_found = match self.registry.lookup(&pair.source, &pair.target, min_tier) {
            Ok(entry) => return Ok(entry),
            Err(e @ AlignError::AlignmentNotFound { .. }) => e,
            Err(e) => return Err(e),
        };

        if !self.config.alignment.compute_on_demand {
            return Err(not_found);
        }
        let Some(source) = &self.anchors else {
            return Err(not_found);
        };

        // One budget covers fetching anchors and fitting the matrix.
        let timeout_ms = self.config.alignment.compute_timeout_ms;
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
        let fetched = match tokio::time::timeout_at(deadline, source.anchors(pair)).await {
            Ok(fetched) => fetched?,
            Err(_) => return Err(compute_timed_out(pair, timeout_ms)),
        };
        let Some(anchors) = fetched else {
            debug!(target: "service", pair = %pair, "No anchor data for pair");
            return Err(not_found);
        };

        let key = AlignmentCacheKey::new(pair, anchors.training_set_hash());
        self.cache
            .get_or_compute(key, || self.compute_and_register(pair, anchors, deadline))
            .await?;

        // The computed matrix is now registered; it may still miss the tier.
        self.registry.lookup(&pair.source, &pair.target, min_tier)
    }

    async fn compute_and_register(
        &self,
        pair: &ModelPair,
        anchors: AnchorSet,
        deadline: tokio::time::Instant,
    ) -> Result<AlignmentMatrix> {
        self.stats.computed();
        let computer = Arc::clone(&self.computer);
        let lambda = self.config.alignment.ridge_lambda;
        let timeout_ms = self.config.alignment.compute_timeout_ms;
        let (source, target) = (pair.source.clone(), pair.target.clone());

        info!(
            target: "service",
            pair = %pair,
            anchors = anchors.source.rows(),
            "Computing alignment on demand"
        );
        let task = tokio::task::spawn_blocking(move || {
            computer
                .compute_alignment(&source, &target, &anchors.source, &anchors.target, lambda)
                .map(|(matrix, _)| matrix)
        });
        let matrix = match tokio::time::timeout_at(deadline, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join)) => {
                return Err(AlignError::internal(format!(
                    "alignment computation panicked or was cancelled: {}",
                    join
                )))
            }
            Err(_) => return Err(compute_timed_out(pair, timeout_ms)),
        };

        let matrix = matrix.with_version(self.registry.next_version(pair));
        self.registry.register(matrix.clone())?;
        Ok(matrix)
    }

    /// Run all firewall stages on `vector` without aligning it.
    pub async fn validate(&self, vector: &LatentVector, strict_mode: bool) -> ValidationReport {
        self.stats.validate_called();
        let report = self.firewall.validate(vector, strict_mode).await;
        if let Some(stage) = report.rejection_reason {
            self.stats.rejected(stage);
        }
        report
    }

    /// Admin path: register a trained matrix with its measured metrics.
    pub fn register_compatibility(
        &self,
        matrix: AlignmentMatrix,
        metrics: QualityMetrics,
    ) -> Result<Registration> {
        self.registry.register_compatibility(matrix, metrics)
    }

    /// Frame an outcome as a signed packet for transport.
    pub fn frame_outcome(
        &self,
        outcome: &AlignOutcome,
        sequence_number: u64,
        signer: &PacketSigner,
        precision: Precision,
    ) -> Result<Packet> {
        Ok(Packet::frame_vector(
            &outcome.aligned_vector,
            outcome.source_model.clone(),
            sequence_number,
            precision,
            signer,
        )?)
    }

    /// [`frame_outcome`](Self::frame_outcome) at the configured default precision.
    pub fn frame_outcome_default(
        &self,
        outcome: &AlignOutcome,
        sequence_number: u64,
        signer: &PacketSigner,
    ) -> Result<Packet> {
        self.frame_outcome(
            outcome,
            sequence_number,
            signer,
            self.config.codec.default_precision,
        )
    }
}

impl std::fmt::Debug for AlignmentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignmentService")
            .field("firewall", &self.firewall)
            .field("registry_entries", &self.registry.len())
            .field("anchors", &self.anchors.is_some())
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

fn compute_timed_out(pair: &ModelPair, timeout_ms: u64) -> AlignError {
    error!(
        target: "service",
        pair = %pair,
        timeout_ms,
        "Alignment computation exceeded its time budget"
    );
    AlignError::Timeout {
        operation: "compute_alignment",
        timeout_ms,
    }
}
