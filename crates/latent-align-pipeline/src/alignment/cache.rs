//! Single-flight cache for computed alignment matrices.
//!
//! Concurrent requests for the same `(source, target, training_set_hash)`
//! share one computation. Each key maps to a `tokio::sync::OnceCell`;
//! `get_or_try_init` runs exactly one initialiser at a time and leaves the
//! cell empty if it fails, so failures are never cached.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use latent_align_core::{AlignmentMatrix, ModelId, ModelPair, Result};
use tokio::sync::OnceCell;
use tracing::debug;

/// Cache key for a computed alignment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlignmentCacheKey {
    pub source: ModelId,
    pub target: ModelId,
    pub training_set_hash: u64,
}

impl AlignmentCacheKey {
    pub fn new(pair: &ModelPair, training_set_hash: u64) -> Self {
        Self {
            source: pair.source.clone(),
            target: pair.target.clone(),
            training_set_hash,
        }
    }
}

type Slot = Arc<OnceCell<Arc<AlignmentMatrix>>>;

#[derive(Debug, Default)]
pub struct SingleFlightCache {
    slots: DashMap<AlignmentCacheKey, Slot>,
}

impl SingleFlightCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached matrix for `key`, or run `compute` once.
    ///
    /// Callers arriving while a computation is in flight wait for it.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: AlignmentCacheKey,
        compute: F,
    ) -> Result<Arc<AlignmentMatrix>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AlignmentMatrix>>,
    {
        // Clone the slot out so no shard lock is held across the await.
        let slot: Slot = self.slots.entry(key.clone()).or_default().clone();
        if let Some(hit) = slot.get() {
            debug!(
                target: "alignment::cache",
                source = %key.source,
                target_model = %key.target,
                "Alignment cache hit"
            );
            return Ok(Arc::clone(hit));
        }
        let matrix = slot
            .get_or_try_init(|| async { compute().await.map(Arc::new) })
            .await?;
        Ok(Arc::clone(matrix))
    }

    /// Completed entries only.
    pub fn get(&self, key: &AlignmentCacheKey) -> Option<Arc<AlignmentMatrix>> {
        self.slots.get(key).and_then(|slot| slot.get().cloned())
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use latent_align_core::{AlignError, QualityMetrics};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn matrix() -> AlignmentMatrix {
        AlignmentMatrix::new(
            ModelId::new("a").unwrap(),
            ModelId::new("b").unwrap(),
            1,
            1,
            vec![1.0],
            QualityMetrics::new(0.9, 0.1, 0.9, 1).unwrap(),
        )
        .unwrap()
    }

    fn key() -> AlignmentCacheKey {
        let pair = ModelPair::new(ModelId::new("a").unwrap(), ModelId::new("b").unwrap());
        AlignmentCacheKey::new(&pair, 42)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_computation() {
        let cache = Arc::new(SingleFlightCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute(key(), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(matrix())
                    })
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        println!("AFTER: computations = {}", calls.load(Ordering::SeqCst));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key()).is_some());
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cache = SingleFlightCache::new();
        let err = cache
            .get_or_compute(key(), || async { Err(AlignError::internal("boom")) })
            .await;
        assert!(err.is_err());
        assert!(cache.get(&key()).is_none());
        assert!(cache.is_empty());

        let ok = cache.get_or_compute(key(), || async { Ok(matrix()) }).await;
        assert!(ok.is_ok());
        assert_eq!(cache.len(), 1);
    }
}
