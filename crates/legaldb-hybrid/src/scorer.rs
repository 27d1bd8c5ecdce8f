use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use legaldb_core::config::FusionConfig;
use legaldb_core::traits::IndexClient;
use legaldb_core::types::{Candidate, SparseVector};
use legaldb_core::Result;

use crate::fusion::{strategy_from_config, FusionStrategy};

/// Queries both modalities of the index and fuses the two hit lists.
pub struct HybridFusionScorer {
    index: Arc<dyn IndexClient>,
    strategy: Box<dyn FusionStrategy>,
}

impl HybridFusionScorer {
    pub fn new(index: Arc<dyn IndexClient>, strategy: Box<dyn FusionStrategy>) -> Self {
        Self { index, strategy }
    }

    pub fn from_config(index: Arc<dyn IndexClient>, config: &FusionConfig) -> Result<Self> {
        Ok(Self::new(index, strategy_from_config(config)?))
    }

    pub fn strategy(&self) -> &dyn FusionStrategy { self.strategy.as_ref() }

    /// Both searches run concurrently and must both succeed; there is no
    /// fusion over a single modality.
    pub fn fuse(&self, dense_query: &[f32], sparse_query: &SparseVector, top_k: usize) -> Result<Vec<Candidate>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let (dense, sparse) = rayon::join(
            || self.index.search_dense(dense_query, top_k),
            || self.index.search_sparse(sparse_query, top_k),
        );
        let (dense, sparse) = (dense?, sparse?);
        let candidates = self.strategy.fuse(&dense, &sparse, top_k);
        debug!(
            strategy = self.strategy.name(),
            dense_hits = dense.len(),
            sparse_hits = sparse.len(),
            candidates = candidates.len(),
            ms = start.elapsed().as_millis() as u64,
            "fused"
        );
        Ok(candidates)
    }
}
