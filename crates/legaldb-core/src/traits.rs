use crate::error::Result;
use crate::types::{Chunk, ChunkId, DualRepresentation, IndexRecord, SearchHit, SparseVector, TextKind};

/// Measures text length in model tokens.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

/// Counts whitespace separated words. Used where no tokenizer is loaded.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordTokenCounter;

impl TokenCounter for WordTokenCounter {
    fn count_tokens(&self, text: &str) -> usize { text.split_whitespace().count() }
}

/// Output of a model for one input text.
///
/// `input_tokens` is the length before truncation, so callers can tell when
/// the model only saw a prefix.
#[derive(Debug, Clone)]
pub struct Encoded {
    pub representation: DualRepresentation,
    pub input_tokens: usize,
}

/// A dense + sparse embedding model.
pub trait Embedder: TokenCounter {
    /// Stable identifier for the model, e.g. `bge-m3:d1024`.
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    /// Maximum sequence length; longer inputs are truncated.
    fn max_len(&self) -> usize;
    /// One output per input, in input order.
    fn embed_batch(&self, texts: &[String], kind: TextKind) -> Result<Vec<Encoded>>;
}

/// Storage and nearest neighbour search for chunk representations.
///
/// Search results are sorted by score descending with ties broken by id.
/// Connectivity problems surface as `Error::IndexUnavailable`.
pub trait IndexClient: Send + Sync {
    fn insert(&self, record: IndexRecord) -> Result<ChunkId>;
    /// Inserts records in order. Backends with batch writes override this.
    fn insert_many(&self, records: Vec<IndexRecord>) -> Result<Vec<ChunkId>> {
        records.into_iter().map(|r| self.insert(r)).collect()
    }
    /// Removes every chunk of a document and returns how many were removed.
    fn delete_document(&self, document_id: &str) -> Result<usize>;
    fn search_dense(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>>;
    fn search_sparse(&self, weights: &SparseVector, top_k: usize) -> Result<Vec<SearchHit>>;
    /// Chunks for the given ids; unknown ids are skipped.
    fn fetch(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>>;
}

/// Joint (query, passage) relevance model.
pub trait CrossEncoder: Send + Sync {
    fn model_id(&self) -> &str;
    /// One score per passage, higher is more relevant.
    fn score_pairs(&self, query: &str, passages: &[String]) -> Result<Vec<f32>>;
}
