//! Privacy budget manager.
//!
//! Each identity has an epsilon budget per accounting window. The
//! check-and-debit runs under the identity's `DashMap` shard lock, so two
//! concurrent releases can never jointly exceed the limit. Noise is drawn
//! only after the debit succeeded, and the whole call is synchronous: there
//! is no await point at which a cancelled caller could leave a partial
//! debit behind.

mod budget;
mod mechanism;

pub use budget::{Clock, PrivacyBudget, SystemClock};
pub use mechanism::gaussian_sigma;

use std::sync::Arc;

use chrono::Duration;
use dashmap::DashMap;
use latent_align_core::config::PrivacyConfig;
use latent_align_core::{AlignError, LatentVector, Result};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Upper bound on the accounting window, keeps timestamp arithmetic in range.
const MAX_WINDOW_SECS: u64 = 100 * 365 * 86_400;

/// What a successful noised release cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivacyReceipt {
    pub identity: String,
    pub epsilon: f64,
    pub delta: f64,
    pub sigma: f64,
    pub epsilon_remaining: f64,
}

/// Tracks per-identity epsilon budgets and applies the Gaussian mechanism.
pub struct PrivacyBudgetManager {
    budgets: DashMap<String, PrivacyBudget>,
    default_limit: f64,
    window: Duration,
    clock: Arc<dyn Clock>,
    rng: Mutex<ChaCha8Rng>,
}

impl PrivacyBudgetManager {
    /// # Errors
    /// `AlignError::Config` if `config` is invalid.
    pub fn new(config: &PrivacyConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &PrivacyConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let rng = match config.rng_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let window_secs = config.window_secs.min(MAX_WINDOW_SECS) as i64;
        Ok(Self {
            budgets: DashMap::new(),
            default_limit: config.default_epsilon_limit,
            window: Duration::seconds(window_secs),
            clock,
            rng: Mutex::new(rng),
        })
    }

    /// Override the limit for one identity. Consumption so far is kept.
    pub fn set_limit(&self, identity: &str, epsilon_limit: f64) -> Result<()> {
        if !epsilon_limit.is_finite() || epsilon_limit <= 0.0 {
            return Err(AlignError::validation(format!(
                "epsilon limit must be finite and > 0, got {}",
                epsilon_limit
            )));
        }
        let now = self.clock.now();
        self.budgets
            .entry(identity.to_string())
            .and_modify(|b| b.epsilon_limit = epsilon_limit)
            .or_insert_with(|| PrivacyBudget::new(identity, epsilon_limit, now));
        Ok(())
    }

    /// Current budget state, with an elapsed window already rolled over.
    pub fn budget(&self, identity: &str) -> PrivacyBudget {
        let now = self.clock.now();
        match self.budgets.get_mut(identity) {
            Some(mut budget) => {
                budget.roll_window(now, self.window);
                budget.clone()
            }
            None => PrivacyBudget::new(identity, self.default_limit, now),
        }
    }

    pub fn remaining(&self, identity: &str) -> f64 {
        self.budget(identity).remaining()
    }

    /// Atomically debit `epsilon` from `identity`.
    ///
    /// # Errors
    /// `AlignError::BudgetExceeded` with the remaining budget and window
    /// reset time. Nothing is debited on failure.
    fn debit(&self, identity: &str, epsilon: f64) -> Result<f64> {
        let now = self.clock.now();
        let mut budget = self
            .budgets
            .entry(identity.to_string())
            .or_insert_with(|| PrivacyBudget::new(identity, self.default_limit, now));

        if budget.roll_window(now, self.window) {
            debug!(
                target: "privacy::budget",
                identity,
                "Accounting window reset"
            );
        }
        if !budget.can_afford(epsilon) {
            let remaining = budget.remaining();
            let resets_at = budget.resets_at(self.window);
            drop(budget);
            warn!(
                target: "privacy::budget",
                identity,
                requested = epsilon,
                remaining,
                resets_at = %resets_at,
                "Privacy budget exceeded"
            );
            return Err(AlignError::BudgetExceeded {
                identity: identity.to_string(),
                requested: epsilon,
                remaining,
                resets_at,
            });
        }
        budget.epsilon_consumed += epsilon;
        Ok(budget.remaining())
    }

    /// Add calibrated Gaussian noise to `vector` and debit `epsilon`.
    ///
    /// Noise is drawn before the debit; a request that fails for any reason
    /// leaves the budget untouched.
    ///
    /// # Errors
    /// - `AlignError::Validation` for out-of-range epsilon/delta, or noise
    ///   that overflows f32
    /// - `AlignError::InvalidVector` if the vector has non-finite components
    /// - `AlignError::BudgetExceeded` if the identity cannot afford `epsilon`
    pub fn inject_privacy(
        &self,
        vector: &LatentVector,
        epsilon: f64,
        delta: f64,
        identity: &str,
    ) -> Result<(LatentVector, PrivacyReceipt)> {
        let sigma = gaussian_sigma(epsilon, delta)?;
        let normal = Normal::new(0.0f64, sigma)
            .map_err(|e| AlignError::validation(format!("noise distribution: {}", e)))?;
        vector.check_finite()?;

        let components: Vec<f32> = {
            let mut rng = self.rng.lock();
            vector
                .components()
                .iter()
                .map(|&x| (f64::from(x) + normal.sample(&mut *rng)) as f32)
                .collect()
        };
        let noised = vector.derive(vector.model_id().clone(), components)?;
        if let Some((index, value)) = noised.first_non_finite() {
            warn!(
                target: "privacy::budget",
                identity,
                epsilon,
                sigma,
                index,
                "Privacy noise overflowed f32; nothing debited"
            );
            return Err(AlignError::validation(format!(
                "noise with sigma {:e} overflowed component {} to {}",
                sigma, index, value
            )));
        }

        let epsilon_remaining = self.debit(identity, epsilon)?;

        info!(
            target: "privacy::budget",
            identity,
            epsilon,
            delta,
            sigma,
            epsilon_remaining,
            "Injected privacy noise"
        );
        Ok((
            noised,
            PrivacyReceipt {
                identity: identity.to_string(),
                epsilon,
                delta,
                sigma,
                epsilon_remaining,
            },
        ))
    }
}

impl std::fmt::Debug for PrivacyBudgetManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivacyBudgetManager")
            .field("identities", &self.budgets.len())
            .field("default_limit", &self.default_limit)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}
