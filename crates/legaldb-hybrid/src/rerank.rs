//! Second stage: cross-encoder re-scoring of the fused candidates.
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use legaldb_core::config::RerankConfig;
use legaldb_core::traits::CrossEncoder;
use legaldb_core::types::{Candidate, Chunk, RankedResult};

/// A fused candidate with its chunk loaded. Position in the input slice is
/// the fused rank.
#[derive(Debug, Clone)]
pub struct FusedChunk {
    pub candidate: Candidate,
    pub chunk: Arc<Chunk>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RerankStatus {
    Applied,
    /// Reranking is switched off; results are in fused order.
    Skipped,
    /// The model was expected but could not be used; results are in fused order.
    Degraded { reason: String },
}

impl RerankStatus {
    pub fn is_degraded(&self) -> bool { matches!(self, Self::Degraded { .. }) }
}

impl fmt::Display for RerankStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => f.write_str("applied"),
            Self::Skipped => f.write_str("skipped"),
            Self::Degraded { reason } => write!(f, "degraded ({reason})"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RerankOutcome {
    pub results: Vec<RankedResult>,
    pub status: RerankStatus,
}

/// Stateless across calls: the model is shared read-only and nothing is cached.
#[derive(Clone)]
pub struct Reranker {
    model: Option<Arc<dyn CrossEncoder>>,
    enabled: bool,
    max_passage_chars: usize,
}

impl Reranker {
    /// `model` is `None` when loading failed; every call then degrades.
    pub fn new(model: Option<Arc<dyn CrossEncoder>>, config: &RerankConfig) -> Self {
        Self { model, enabled: config.enabled, max_passage_chars: config.max_passage_chars.max(1) }
    }

    pub fn rerank(&self, query: &str, candidates: &[FusedChunk], top_n: usize) -> RerankOutcome {
        if !self.enabled {
            return fused_order(candidates, top_n, RerankStatus::Skipped);
        }
        let Some(model) = &self.model else {
            warn!("no cross-encoder loaded, returning fused order");
            return fused_order(candidates, top_n, RerankStatus::Degraded { reason: "cross-encoder not loaded".into() });
        };
        if candidates.is_empty() {
            return RerankOutcome { results: Vec::new(), status: RerankStatus::Applied };
        }

        let start = Instant::now();
        let passages: Vec<String> = candidates.iter().map(|c| truncate_chars(&c.chunk.text, self.max_passage_chars)).collect();
        let scores = match model.score_pairs(query, &passages) {
            Ok(scores) if scores.len() == candidates.len() => scores,
            Ok(scores) => {
                let reason = format!("{} returned {} scores for {} passages", model.model_id(), scores.len(), candidates.len());
                warn!(%reason, "reranking degraded");
                return fused_order(candidates, top_n, RerankStatus::Degraded { reason });
            }
            Err(e) => {
                warn!(error = %e, "reranking degraded");
                return fused_order(candidates, top_n, RerankStatus::Degraded { reason: e.to_string() });
            }
        };

        let mut results: Vec<RankedResult> = candidates
            .iter()
            .zip(scores)
            .enumerate()
            .map(|(fused_rank, (c, score))| RankedResult {
                chunk: Arc::clone(&c.chunk),
                rerank_score: if score.is_nan() { f32::NEG_INFINITY } else { score },
                fused_rank,
            })
            .collect();
        results.sort_by(|a, b| b.rerank_score.total_cmp(&a.rerank_score).then_with(|| a.fused_rank.cmp(&b.fused_rank)));
        results.truncate(top_n);
        debug!(model = model.model_id(), pairs = candidates.len(), kept = results.len(), ms = start.elapsed().as_millis() as u64, "reranked");
        RerankOutcome { results, status: RerankStatus::Applied }
    }
}

/// Fused order truncated to `top_n`; the fused score stands in for the rerank score.
fn fused_order(candidates: &[FusedChunk], top_n: usize, status: RerankStatus) -> RerankOutcome {
    let results = candidates
        .iter()
        .take(top_n)
        .enumerate()
        .map(|(fused_rank, c)| RankedResult { chunk: Arc::clone(&c.chunk), rerank_score: c.candidate.fused_score, fused_rank })
        .collect();
    RerankOutcome { results, status }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}
