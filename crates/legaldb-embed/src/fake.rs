//! Deterministic stand-ins for the neural models. Texts with the same words
//! get the same vectors; overlapping words give overlapping vectors.
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use legaldb_core::traits::{CrossEncoder, Embedder, Encoded, TokenCounter};
use legaldb_core::types::{l2_normalize, DualRepresentation, SparseVector, TextKind};
use legaldb_core::Result;

/// Size of the XLM-R vocabulary; fake term ids fall in the same range.
const FAKE_VOCAB: u64 = 250_002;

fn hash_token(token: &str) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    token.hash(&mut hasher);
    hasher.finish()
}

/// Lowercased words with surrounding punctuation removed.
pub fn normalized_tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

pub struct FakeEmbedder {
    dim: usize,
    max_len: usize,
    model_id: String,
}

impl FakeEmbedder {
    pub fn new(dim: usize, max_len: usize) -> Self {
        Self { dim: dim.max(1), max_len, model_id: format!("fake:d{dim}") }
    }

    fn encode(&self, text: &str) -> Encoded {
        let input_tokens = self.count_tokens(text);
        let words: Vec<&str> = text.split_whitespace().take(self.max_len).collect();
        let tokens = normalized_tokens(&words.join(" "));

        let mut dense = vec![0f32; self.dim];
        let mut tf: BTreeMap<u32, u32> = BTreeMap::new();
        for token in &tokens {
            let h = hash_token(token);
            let idx = (h as usize) % self.dim;
            dense[idx] += 1.0 + (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            *tf.entry((h % FAKE_VOCAB) as u32).or_insert(0) += 1;
        }
        l2_normalize(&mut dense);

        let raw: Vec<(u32, f32)> = tf.into_iter().map(|(id, n)| (id, 1.0 + (n as f32).ln())).collect();
        let max = raw.iter().map(|(_, w)| *w).fold(0f32, f32::max);
        let sparse: SparseVector = if max > 0.0 { raw.into_iter().map(|(id, w)| (id, w / max)).collect() } else { SparseVector::new() };

        Encoded { representation: DualRepresentation::new(dense, sparse), input_tokens }
    }
}

impl TokenCounter for FakeEmbedder {
    fn count_tokens(&self, text: &str) -> usize { text.split_whitespace().count() }
}

impl Embedder for FakeEmbedder {
    fn model_id(&self) -> &str { &self.model_id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }

    fn embed_batch(&self, texts: &[String], _kind: TextKind) -> Result<Vec<Encoded>> {
        Ok(texts.iter().map(|t| self.encode(t)).collect())
    }
}

/// Scores a passage by the share of query words it contains.
#[derive(Debug, Default, Clone, Copy)]
pub struct FakeCrossEncoder;

impl CrossEncoder for FakeCrossEncoder {
    fn model_id(&self) -> &str { "fake-cross-encoder" }

    fn score_pairs(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        let query: BTreeSet<String> = normalized_tokens(query).into_iter().collect();
        Ok(passages
            .iter()
            .map(|p| {
                if query.is_empty() {
                    return 0.0;
                }
                let passage: BTreeSet<String> = normalized_tokens(p).into_iter().collect();
                query.intersection(&passage).count() as f32 / query.len() as f32
            })
            .collect())
    }
}
