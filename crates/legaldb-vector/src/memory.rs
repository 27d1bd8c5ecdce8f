//! Exact in-process index: brute-force cosine and sparse inner product.
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::debug;

use legaldb_core::traits::IndexClient;
use legaldb_core::types::{cosine_similarity, sparse_inner_product, Chunk, ChunkId, IndexRecord, SearchHit, SourceKind, SparseVector};
use legaldb_core::{Error, Result};

use crate::rank_hits;

#[derive(Default)]
pub struct MemoryIndex {
    dim: Option<usize>,
    records: RwLock<BTreeMap<ChunkId, IndexRecord>>,
}

impl MemoryIndex {
    pub fn new() -> Self { Self::default() }

    /// Rejects records whose dense vector is not `dim` long.
    pub fn with_dim(dim: usize) -> Self { Self { dim: Some(dim), ..Self::default() } }

    pub fn len(&self) -> usize { self.records.read().len() }

    pub fn is_empty(&self) -> bool { self.records.read().is_empty() }
}

impl IndexClient for MemoryIndex {
    fn insert(&self, record: IndexRecord) -> Result<ChunkId> {
        if let Some(dim) = self.dim {
            if record.representation.dense.len() != dim {
                return Err(Error::Operation(format!(
                    "vector for {} has {} dims, index expects {dim}",
                    record.chunk.id,
                    record.representation.dense.len()
                )));
            }
        }
        let id = record.chunk.id.clone();
        self.records.write().insert(id.clone(), record);
        Ok(id)
    }

    fn delete_document(&self, document_id: &str) -> Result<usize> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, r| r.chunk.document_id != document_id);
        let removed = before - records.len();
        debug!(document_id, removed, "document removed from memory index");
        Ok(removed)
    }

    fn search_dense(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        let hits = self
            .records
            .read()
            .values()
            .map(|r| SearchHit {
                id: r.chunk.id.clone(),
                score: cosine_similarity(vector, &r.representation.dense),
                source: SourceKind::Dense,
            })
            .collect();
        Ok(rank_hits(hits, top_k))
    }

    fn search_sparse(&self, weights: &SparseVector, top_k: usize) -> Result<Vec<SearchHit>> {
        let hits = self
            .records
            .read()
            .values()
            .filter_map(|r| {
                let score = sparse_inner_product(weights, &r.representation.sparse);
                (score > 0.0).then(|| SearchHit { id: r.chunk.id.clone(), score, source: SourceKind::Sparse })
            })
            .collect();
        Ok(rank_hits(hits, top_k))
    }

    fn fetch(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>> {
        let records = self.records.read();
        Ok(ids.iter().filter_map(|id| records.get(id).map(|r| r.chunk.clone())).collect())
    }
}
