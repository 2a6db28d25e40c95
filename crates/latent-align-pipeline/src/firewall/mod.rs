//! Latent-space firewall.
//!
//! | Stage | Check | Cost |
//! |-------|-------|------|
//! | 1 statistical | NaN/Inf, KS vs N(0,1), per-component z-score | O(d log d), deterministic |
//! | 2 adversarial | pluggable classifier score vs threshold | bounded by stage timeout |
//! | 3 semantic | pluggable decoder + pattern scan | bounded by stage timeout |
//!
//! Every collaborator failure, timeout or out-of-range answer is a
//! rejection: the firewall fails closed.

mod report;
mod semantic;
mod statistical;

pub use report::{FirewallState, ValidationReport};
pub use semantic::{PatternScanner, BUILTIN_PATTERNS};

use std::sync::Arc;
use std::time::Duration;

use latent_align_core::config::FirewallConfig;
use latent_align_core::{AlignError, LatentVector, RejectionReason, Result};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::traits::{AdversarialClassifier, SampleDecoder};
use statistical::{StatisticalCheck, StatisticalThresholds};

type StageVerdict = std::result::Result<(), RejectionReason>;

#[derive(Debug, Clone, Copy)]
struct Thresholds {
    statistical: StatisticalThresholds,
    adversarial: f64,
}

/// Three-stage validator gating every vector before alignment or release.
pub struct LatentSpaceFirewall {
    config: FirewallConfig,
    statistical: StatisticalCheck,
    scanner: PatternScanner,
    classifier: Arc<dyn AdversarialClassifier>,
    decoder: Arc<dyn SampleDecoder>,
    stage_timeout: Duration,
}

impl LatentSpaceFirewall {
    /// # Errors
    /// - `AlignError::Config` if `config` is invalid
    /// - `AlignError::Validation` if an extra pattern does not compile
    pub fn new(
        config: FirewallConfig,
        classifier: Arc<dyn AdversarialClassifier>,
        decoder: Arc<dyn SampleDecoder>,
    ) -> Result<Self> {
        config.validate()?;
        let scanner = PatternScanner::new(&config.extra_patterns)?;
        Ok(Self {
            stage_timeout: Duration::from_millis(config.stage_timeout_ms),
            statistical: StatisticalCheck::new()?,
            scanner,
            classifier,
            decoder,
            config,
        })
    }

    pub fn config(&self) -> &FirewallConfig {
        &self.config
    }

    fn thresholds(&self, strict: bool) -> Thresholds {
        let (ks, z, adversarial) = if strict {
            (
                self.config.strict.ks_threshold,
                self.config.strict.z_score_threshold,
                self.config.strict.adversarial_threshold,
            )
        } else {
            (
                self.config.ks_threshold,
                self.config.z_score_threshold,
                self.config.adversarial_threshold,
            )
        };
        Thresholds {
            statistical: StatisticalThresholds {
                ks,
                z_score: z,
                ks_min_dimension: self.config.ks_min_dimension,
            },
            adversarial,
        }
    }

    /// Stages 1 and 2 on an input vector, short-circuiting on the first
    /// rejection. Returns the adversarial score.
    ///
    /// # Errors
    /// `AlignError::FirewallRejection { transformed: false, .. }`.
    pub async fn check_input(
        &self,
        vector: &LatentVector,
        strict: bool,
        request_id: Uuid,
    ) -> Result<f64> {
        let thresholds = self.thresholds(strict);
        let mut state = FirewallState::Pending.advance();

        if let Err(reason) = self.statistical_stage(vector, thresholds) {
            return Err(self.rejected(request_id, state.reject(reason), false));
        }
        state = state.advance();

        let (score, verdict) = self.adversarial_stage(vector, thresholds.adversarial).await;
        if let Err(reason) = verdict {
            return Err(self.rejected(request_id, state.reject(reason), false));
        }

        // Stage 3 runs later on the transformed vector.
        audit(request_id, &state, false);
        Ok(score.unwrap_or_default())
    }

    /// Stage 3 on an aligned vector.
    ///
    /// Non-finite output is rejected as a statistical failure before the
    /// decoder sees it.
    ///
    /// # Errors
    /// `AlignError::FirewallRejection { transformed: true, .. }`.
    pub async fn check_transformed(&self, vector: &LatentVector, request_id: Uuid) -> Result<()> {
        if vector.first_non_finite().is_some() {
            let state = FirewallState::Statistical.reject(RejectionReason::NonFinite);
            return Err(self.rejected(request_id, state, true));
        }
        let state = FirewallState::Semantic;
        if let Err(reason) = self.semantic_stage(vector).await {
            return Err(self.rejected(request_id, state.reject(reason), true));
        }
        audit(request_id, &state.advance(), true);
        Ok(())
    }

    /// Run every stage and report full diagnostics.
    ///
    /// Stages do not short-circuit each other, except that stages 2 and 3
    /// are skipped for vectors with non-finite components.
    pub async fn validate(&self, vector: &LatentVector, strict: bool) -> ValidationReport {
        self.validate_with_id(vector, strict, Uuid::new_v4()).await
    }

    pub async fn validate_with_id(
        &self,
        vector: &LatentVector,
        strict: bool,
        request_id: Uuid,
    ) -> ValidationReport {
        let thresholds = self.thresholds(strict);
        let mut state = FirewallState::Pending.advance();
        let mut report = ValidationReport {
            request_id,
            is_valid: false,
            statistical_pass: false,
            adversarial_score: None,
            semantic_pass: None,
            rejection_reason: None,
            rejection_cause: None,
            strict_mode: strict,
            state,
        };

        let stage1 = self.statistical_stage(vector, thresholds);
        report.statistical_pass = stage1.is_ok();
        record_failure(&mut report, state, stage1);

        if stage1 != Err(RejectionReason::NonFinite) {
            state = state.advance();
            let (score, stage2) = self.adversarial_stage(vector, thresholds.adversarial).await;
            report.adversarial_score = score;
            record_failure(&mut report, state, stage2);

            state = state.advance();
            let stage3 = self.semantic_stage(vector).await;
            report.semantic_pass = Some(stage3.is_ok());
            record_failure(&mut report, state, stage3);
        }

        report.is_valid = report.rejection_reason.is_none();
        report.state = match (report.rejection_reason, report.rejection_cause) {
            (Some(stage), Some(reason)) => FirewallState::Rejected { stage, reason },
            _ => FirewallState::Accepted,
        };
        audit(request_id, &report.state, false);
        report
    }

    fn statistical_stage(&self, vector: &LatentVector, thresholds: Thresholds) -> StageVerdict {
        let outcome = self.statistical.run(vector, thresholds.statistical);
        debug!(
            target: "firewall::statistical",
            dim = vector.dimension(),
            ks = ?outcome.ks_statistic,
            max_abs_z = ?outcome.max_abs_z,
            verdict = ?outcome.verdict,
            "Statistical stage evaluated"
        );
        outcome.verdict
    }

    async fn adversarial_stage(
        &self,
        vector: &LatentVector,
        threshold: f64,
    ) -> (Option<f64>, StageVerdict) {
        let result = tokio::time::timeout(self.stage_timeout, self.classifier.classify(vector)).await;
        match result {
            Ok(Ok(score)) if (0.0..=1.0).contains(&score) => {
                debug!(
                    target: "firewall::adversarial",
                    classifier = self.classifier.name(),
                    score,
                    "Adversarial stage evaluated"
                );
                let verdict = if score > threshold {
                    Err(RejectionReason::AdversarialScore)
                } else {
                    Ok(())
                };
                (Some(score), verdict)
            }
            Ok(Ok(score)) => {
                warn!(
                    target: "firewall::adversarial",
                    classifier = self.classifier.name(),
                    score,
                    "Classifier score outside [0, 1]; treating as adversarial"
                );
                (None, Err(RejectionReason::AdversarialScore))
            }
            Ok(Err(e)) => {
                warn!(
                    target: "firewall::adversarial",
                    classifier = self.classifier.name(),
                    error = %e,
                    "Classifier failed; rejecting"
                );
                (None, Err(RejectionReason::CollaboratorFault))
            }
            Err(_) => {
                warn!(
                    target: "firewall::adversarial",
                    classifier = self.classifier.name(),
                    timeout_ms = self.config.stage_timeout_ms,
                    "Classifier timed out; rejecting"
                );
                (None, Err(RejectionReason::Timeout))
            }
        }
    }

    async fn semantic_stage(&self, vector: &LatentVector) -> StageVerdict {
        let samples = self.config.decoder_samples;
        let scan = async {
            let decoded = self.decoder.decode_samples(vector, samples).await?;
            Ok::<bool, AlignError>(self.scanner.matches_any(&decoded))
        };
        match tokio::time::timeout(self.stage_timeout, scan).await {
            Ok(Ok(false)) => {
                debug!(
                    target: "firewall::semantic",
                    decoder = self.decoder.name(),
                    "Semantic stage evaluated"
                );
                Ok(())
            }
            Ok(Ok(true)) => Err(RejectionReason::PatternMatch),
            Ok(Err(e)) => {
                warn!(
                    target: "firewall::semantic",
                    decoder = self.decoder.name(),
                    error = %e,
                    "Decoder failed; rejecting"
                );
                Err(RejectionReason::CollaboratorFault)
            }
            Err(_) => {
                warn!(
                    target: "firewall::semantic",
                    decoder = self.decoder.name(),
                    timeout_ms = self.config.stage_timeout_ms,
                    "Decoder timed out; rejecting"
                );
                Err(RejectionReason::Timeout)
            }
        }
    }

    fn rejected(&self, request_id: Uuid, state: FirewallState, transformed: bool) -> AlignError {
        audit(request_id, &state, transformed);
        match state {
            FirewallState::Rejected { stage, reason } => {
                warn!(
                    target: "firewall",
                    request_id = %request_id,
                    stage = %stage,
                    reason = %reason,
                    transformed,
                    "Vector rejected"
                );
                AlignError::FirewallRejection {
                    stage,
                    reason,
                    transformed,
                }
            }
            other => AlignError::internal(format!("firewall rejected in non-stage state {}", other)),
        }
    }
}

impl std::fmt::Debug for LatentSpaceFirewall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatentSpaceFirewall")
            .field("config", &self.config)
            .field("classifier", &self.classifier.name())
            .field("decoder", &self.decoder.name())
            .field("patterns", &self.scanner.pattern_count())
            .finish()
    }
}

fn record_failure(report: &mut ValidationReport, state: FirewallState, verdict: StageVerdict) {
    if let Err(reason) = verdict {
        if report.rejection_reason.is_none() {
            report.rejection_reason = state.stage();
            report.rejection_cause = Some(reason);
        }
    }
}

fn audit(request_id: Uuid, state: &FirewallState, transformed: bool) {
    let (verdict, category) = match state {
        FirewallState::Rejected { stage, .. } => ("rejected", stage.as_str()),
        _ => ("accepted", "none"),
    };
    info!(
        target: "firewall::audit",
        request_id = %request_id,
        verdict,
        category,
        transformed,
        final_state = %state,
        "Firewall verdict"
    );
}
