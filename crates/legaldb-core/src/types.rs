//! Domain types shared by the chunker, the index clients and the retrieval pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type ChunkId = String;

/// Lexical weights keyed by vocabulary term id. Weights are non-negative.
pub type SparseVector = BTreeMap<u32, f32>;

/// Plain text of one source document as handed over by a loader.
///
/// `page_breaks` holds the byte offsets in `body` at which pages 2, 3, ...
/// begin, in ascending order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredText {
    pub title: String,
    pub body: String,
    pub page_breaks: Vec<usize>,
}

impl StructuredText {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self { title: title.into(), body: body.into(), page_breaks: Vec::new() }
    }

    pub fn with_page_breaks(mut self, mut page_breaks: Vec<usize>) -> Self {
        page_breaks.sort_unstable();
        self.page_breaks = page_breaks;
        self
    }

    /// 1-based page containing the byte at `offset`.
    pub fn page_at(&self, offset: usize) -> u32 {
        let breaks_before = self.page_breaks.partition_point(|&b| b <= offset);
        u32::try_from(breaks_before).map_or(u32::MAX, |n| n.saturating_add(1))
    }
}

/// The atomic retrievable unit.
///
/// - `id`: `"{document_id}:{chunk_index}"`, stable across re-indexing of the same text
/// - `chapter`/`article`/`clause`: hierarchy locators, `None` when the text carries no marker
/// - `part_index`: set only when a clause had to be split to fit the token budget
/// - `text`: clause body, optionally prefixed by `context_path` on its own line
/// - `token_count`: length of `text` under the embedding model's tokenizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: String,
    pub document_name: String,
    pub document_code: Option<String>,
    pub chapter: Option<String>,
    pub chapter_title: Option<String>,
    pub article: Option<String>,
    pub article_title: Option<String>,
    pub clause: Option<String>,
    pub part_index: Option<u32>,
    pub context_path: String,
    pub text: String,
    pub token_count: usize,
    pub page_number: u32,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

impl Chunk {
    pub fn is_structured(&self) -> bool {
        self.chapter.is_some() || self.article.is_some() || self.clause.is_some()
    }

    /// Human readable locator, e.g. `[QCVN 06 - Chương I - Điều 5 - Khoản 1]`.
    pub fn locator(&self) -> String {
        let mut parts = vec![self.document_name.clone()];
        if let Some(chapter) = &self.chapter { parts.push(chapter_label(chapter)); }
        if let Some(article) = &self.article { parts.push(format!("Điều {article}")); }
        if let Some(clause) = &self.clause { parts.push(format!("Khoản {clause}")); }
        if let Some(part) = self.part_index { parts.push(format!("phần {}", part + 1)); }
        format!("[{}]", parts.join(" - "))
    }
}

/// Display label for a chapter locator. Appendix locators are already labelled.
pub fn chapter_label(chapter: &str) -> String {
    if chapter.starts_with("Phụ lục") { chapter.to_string() } else { format!("Chương {chapter}") }
}

/// Whether a text is embedded as a query or as an indexed passage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextKind {
    Query,
    Document,
}

/// Dense vector plus sparse lexical weights for one text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DualRepresentation {
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
}

impl DualRepresentation {
    pub fn new(dense: Vec<f32>, sparse: SparseVector) -> Self { Self { dense, sparse } }
}

/// What an index client stores per chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub chunk: Chunk,
    pub representation: DualRepresentation,
}

/// Indicates which modality produced a hit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    Dense,
    Sparse,
}

/// A ranked id returned by one modality of the index.
///
/// `score` is modality specific (cosine similarity or inner product) and
/// higher is always better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: ChunkId,
    pub score: f32,
    pub source: SourceKind,
}

/// A fused candidate. Query scoped; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub chunk_id: ChunkId,
    pub dense_score: f32,
    pub sparse_score: f32,
    pub fused_score: f32,
}

/// A passage after the second stage. `fused_rank` is its 0-based position in
/// the fused list and is only used to break ties.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedResult {
    pub chunk: Arc<Chunk>,
    pub rerank_score: f32,
    pub fused_rank: usize,
}

/// A citable reference derived 1:1 from a [`RankedResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: ChunkId,
    pub document_name: String,
    pub chapter: Option<String>,
    pub article: Option<String>,
    pub clause: Option<String>,
    pub page_number: u32,
    pub text_preview: String,
    pub preview_truncated: bool,
    pub locator: String,
}

/// Cosine similarity; 0.0 when either vector has zero norm or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() { return 0.0; }
    let (mut dot, mut na, mut nb) = (0f32, 0f32, 0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom <= f32::EPSILON { 0.0 } else { dot / denom }
}

/// Weighted overlap of two sparse vectors.
pub fn sparse_inner_product(a: &SparseVector, b: &SparseVector) -> f32 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small.iter().filter_map(|(term, w)| large.get(term).map(|v| w * v)).sum()
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() { *x /= norm; }
    }
}
