//! In-memory anchor source.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use latent_align_core::{ModelPair, Result};
use parking_lot::RwLock;

use crate::traits::{AnchorSet, AnchorSource};

#[derive(Debug, Default)]
pub struct InMemoryAnchorSource {
    sets: RwLock<HashMap<ModelPair, AnchorSet>>,
    requests: AtomicU64,
}

impl InMemoryAnchorSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, pair: ModelPair, anchors: AnchorSet) {
        self.sets.write().insert(pair, anchors);
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnchorSource for InMemoryAnchorSource {
    async fn anchors(&self, pair: &ModelPair) -> Result<Option<AnchorSet>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(self.sets.read().get(pair).cloned())
    }
}
