//! Hybrid retrieval: dense + sparse fusion, cross-encoder reranking and the
//! end to end indexing and query pipeline.

pub mod fusion;
pub mod pipeline;
pub mod rerank;
pub mod scorer;

pub use fusion::{strategy_from_config, FusionStrategy, ReciprocalRank, WeightedMinMax};
pub use pipeline::{Deadline, IndexReport, Passage, QueryStats, RetrievalOutcome, RetrievalPipeline};
pub use rerank::{FusedChunk, RerankOutcome, RerankStatus, Reranker};
pub use scorer::HybridFusionScorer;
