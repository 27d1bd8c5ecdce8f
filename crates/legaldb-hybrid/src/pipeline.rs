//! Indexing flow and query flow.
//!
//! Indexing: text -> chunks -> dense + sparse representations -> index, with
//! earlier chunks of the same document removed first. Querying: query ->
//! representations -> fused top-K -> reranked top-N -> citations, with an
//! optional deadline checked between stages.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use legaldb_core::chunker::StructuralChunker;
use legaldb_core::citation::CitationBuilder;
use legaldb_core::config::Settings;
use legaldb_core::error::Stage;
use legaldb_core::traits::{CrossEncoder, Embedder, IndexClient};
use legaldb_core::types::{Candidate, Chunk, Citation, IndexRecord, RankedResult, StructuredText, TextKind};
use legaldb_core::{Error, Result};
use legaldb_embed::DualEmbedder;

use crate::rerank::{FusedChunk, RerankStatus, Reranker};
use crate::scorer::HybridFusionScorer;

/// Query time budget. Only checked at stage boundaries, so a stage that is
/// already running is never interrupted.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    pub fn new(budget: Option<Duration>) -> Self { Self { start: Instant::now(), budget } }

    pub fn unbounded() -> Self { Self::new(None) }

    /// Fails with [`Error::Timeout`] once the budget is used up.
    pub fn check(&self, next: Stage) -> Result<()> {
        let Some(budget) = self.budget else { return Ok(()) };
        let elapsed = self.start.elapsed();
        if elapsed >= budget {
            return Err(Error::Timeout { stage: next, elapsed_ms: elapsed.as_millis() as u64, budget_ms: budget.as_millis() as u64 });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexReport {
    pub document_id: String,
    pub chunks_produced: usize,
    pub chunks_stored: usize,
    /// Chunks of the previous version of the document that were removed.
    pub chunks_replaced: usize,
    pub truncated: usize,
    /// Chunk characters over source characters. Headers and overlap can push it above 1.
    pub coverage: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryStats {
    pub encoding_ms: u64,
    pub retrieval_ms: u64,
    pub reranking_ms: u64,
    pub total_ms: u64,
    pub candidates: usize,
    pub missing_chunks: usize,
    pub results: usize,
}

/// Everything a query produced. `results` and `citations` are parallel and in rank order.
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    pub query: String,
    pub candidates: Vec<Candidate>,
    pub results: Vec<RankedResult>,
    pub citations: Vec<Citation>,
    pub status: RerankStatus,
    pub stats: QueryStats,
}

/// A passage handed to answer generation.
#[derive(Debug, Clone, Copy)]
pub struct Passage<'a> {
    pub rank: usize,
    pub chunk: &'a Chunk,
    pub citation: &'a Citation,
}

impl RetrievalOutcome {
    pub fn is_empty(&self) -> bool { self.results.is_empty() }

    pub fn is_degraded(&self) -> bool { self.status.is_degraded() }

    pub fn passages(&self) -> Vec<Passage<'_>> {
        self.results
            .iter()
            .zip(&self.citations)
            .enumerate()
            .map(|(rank, (r, citation))| Passage { rank: rank + 1, chunk: r.chunk.as_ref(), citation })
            .collect()
    }
}

/// Request scoped and stateless between queries: it only holds shared
/// read-only handles, so one pipeline can serve concurrent queries.
pub struct RetrievalPipeline {
    chunker: StructuralChunker,
    embedder: DualEmbedder,
    index: Arc<dyn IndexClient>,
    scorer: HybridFusionScorer,
    reranker: Reranker,
    citations: CitationBuilder,
    top_k: usize,
    top_n: usize,
    timeout: Option<Duration>,
}

impl RetrievalPipeline {
    pub fn new(
        settings: &Settings,
        model: Arc<dyn Embedder>,
        index: Arc<dyn IndexClient>,
        cross_encoder: Option<Arc<dyn CrossEncoder>>,
    ) -> Result<Self> {
        settings.validate()?;
        let embedder = DualEmbedder::new(model, &settings.embedding);
        let chunker = StructuralChunker::new(settings.chunking.clone(), Arc::new(embedder.clone()));
        let scorer = HybridFusionScorer::from_config(Arc::clone(&index), &settings.fusion)?;
        info!(
            model = embedder.model().model_id(),
            fusion = scorer.strategy().name(),
            rerank = settings.rerank.enabled,
            cross_encoder = cross_encoder.is_some(),
            "retrieval pipeline ready"
        );
        Ok(Self {
            chunker,
            embedder,
            index,
            scorer,
            reranker: Reranker::new(cross_encoder, &settings.rerank),
            citations: CitationBuilder::new(settings.citation.preview_chars),
            top_k: settings.rerank.top_k,
            top_n: settings.rerank.top_n,
            timeout: settings.query.timeout_ms.map(Duration::from_millis),
        })
    }

    pub fn chunker(&self) -> &StructuralChunker { &self.chunker }

    /// Replaces every stored chunk of `document_id` with chunks of `text`.
    ///
    /// Embedding happens before the old chunks are removed, so a model
    /// failure leaves the previous version searchable.
    pub fn index_document(&self, document_id: &str, text: &StructuredText) -> Result<IndexReport> {
        let start = Instant::now();
        let chunks = self.chunker.chunk(document_id, text);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embedded = self.embedder.embed_with_report(&texts, TextKind::Document)?;

        let chunks_replaced = self.index.delete_document(document_id)?;
        let chunk_chars: usize = chunks.iter().map(|c| c.text.chars().count()).sum();
        let records: Vec<IndexRecord> = chunks
            .into_iter()
            .zip(embedded.representations)
            .map(|(chunk, representation)| IndexRecord { chunk, representation })
            .collect();
        let chunks_produced = records.len();
        let stored = self.index.insert_many(records)?;

        let source_chars = text.body.chars().count();
        let report = IndexReport {
            document_id: document_id.to_string(),
            chunks_produced,
            chunks_stored: stored.len(),
            chunks_replaced,
            truncated: embedded.truncated,
            coverage: if source_chars == 0 { 0.0 } else { chunk_chars as f64 / source_chars as f64 },
        };
        info!(
            document_id,
            chunks = report.chunks_stored,
            replaced = report.chunks_replaced,
            truncated = report.truncated,
            ms = start.elapsed().as_millis() as u64,
            "document indexed"
        );
        Ok(report)
    }

    pub fn retrieve(&self, query: &str) -> Result<RetrievalOutcome> {
        self.retrieve_with_deadline(query, Deadline::new(self.timeout))
    }

    pub fn retrieve_with_deadline(&self, query: &str, deadline: Deadline) -> Result<RetrievalOutcome> {
        let total = Instant::now();
        let mut stats = QueryStats::default();

        deadline.check(Stage::Encoding)?;
        let t = Instant::now();
        let q = self.embedder.embed_query(query)?;
        stats.encoding_ms = t.elapsed().as_millis() as u64;

        deadline.check(Stage::Retrieval)?;
        let t = Instant::now();
        let candidates = self.scorer.fuse(&q.dense, &q.sparse, self.top_k)?;
        stats.candidates = candidates.len();

        deadline.check(Stage::Fetch)?;
        let ids: Vec<_> = candidates.iter().map(|c| c.chunk_id.clone()).collect();
        let mut chunks: HashMap<_, _> = self.index.fetch(&ids)?.into_iter().map(|c| (c.id.clone(), Arc::new(c))).collect();
        let fused: Vec<FusedChunk> = candidates
            .iter()
            .filter_map(|c| match chunks.remove(&c.chunk_id) {
                Some(chunk) => Some(FusedChunk { candidate: c.clone(), chunk }),
                None => {
                    warn!(chunk_id = %c.chunk_id, "candidate missing from index, skipped");
                    None
                }
            })
            .collect();
        stats.missing_chunks = candidates.len() - fused.len();
        stats.retrieval_ms = t.elapsed().as_millis() as u64;

        deadline.check(Stage::Reranking)?;
        let t = Instant::now();
        let reranked = self.reranker.rerank(query, &fused, self.top_n);
        stats.reranking_ms = t.elapsed().as_millis() as u64;

        deadline.check(Stage::Citation)?;
        let citations = self.citations.build(&reranked.results);
        stats.results = reranked.results.len();
        stats.total_ms = total.elapsed().as_millis() as u64;

        if stats.results == 0 {
            debug!(query, "no passages found");
        }
        info!(
            candidates = stats.candidates,
            results = stats.results,
            rerank = %reranked.status,
            encoding_ms = stats.encoding_ms,
            retrieval_ms = stats.retrieval_ms,
            reranking_ms = stats.reranking_ms,
            total_ms = stats.total_ms,
            "query answered"
        );
        Ok(RetrievalOutcome {
            query: query.to_string(),
            candidates,
            results: reranked.results,
            citations,
            status: reranked.status,
            stats,
        })
    }
}
