use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use legaldb_core::config::EmbeddingConfig;
use legaldb_core::traits::{Embedder, Encoded, TokenCounter};
use legaldb_core::types::{DualRepresentation, TextKind};
use legaldb_core::{Error, Result};

/// Representations for a list of texts, in input order.
#[derive(Debug, Clone, Default)]
pub struct EmbedReport {
    pub representations: Vec<DualRepresentation>,
    /// Inputs the model only saw a prefix of.
    pub truncated: usize,
}

/// Batching front end over an [`Embedder`].
///
/// Batch size and parallelism only affect throughput: every text is encoded
/// independently, and outputs are reassembled in input order.
#[derive(Clone)]
pub struct DualEmbedder {
    model: Arc<dyn Embedder>,
    batch_size: usize,
    parallel: bool,
}

impl DualEmbedder {
    pub fn new(model: Arc<dyn Embedder>, config: &EmbeddingConfig) -> Self {
        Self { model, batch_size: config.batch_size.max(1), parallel: config.parallel_batches }
    }

    pub fn model(&self) -> &Arc<dyn Embedder> { &self.model }

    pub fn embed(&self, texts: &[String], kind: TextKind) -> Result<Vec<DualRepresentation>> {
        Ok(self.embed_with_report(texts, kind)?.representations)
    }

    pub fn embed_query(&self, query: &str) -> Result<DualRepresentation> {
        self.embed(&[query.to_string()], TextKind::Query)?
            .pop()
            .ok_or_else(|| Error::Model("embedder returned no output for the query".into()))
    }

    pub fn embed_with_report(&self, texts: &[String], kind: TextKind) -> Result<EmbedReport> {
        if texts.is_empty() {
            return Ok(EmbedReport::default());
        }
        let start = Instant::now();
        let run = |batch: &[String]| -> Result<Vec<Encoded>> {
            let out = self.model.embed_batch(batch, kind)?;
            if out.len() != batch.len() {
                return Err(Error::Model(format!("{} returned {} outputs for {} inputs", self.model.model_id(), out.len(), batch.len())));
            }
            Ok(out)
        };
        let batches: Vec<&[String]> = texts.chunks(self.batch_size).collect();
        let encoded: Vec<Vec<Encoded>> = if self.parallel && batches.len() > 1 {
            batches.par_iter().map(|b| run(b)).collect::<Result<_>>()?
        } else {
            batches.iter().map(|b| run(b)).collect::<Result<_>>()?
        };

        let max_len = self.model.max_len();
        let mut report = EmbedReport { representations: Vec::with_capacity(texts.len()), truncated: 0 };
        for (i, item) in encoded.into_iter().flatten().enumerate() {
            if item.input_tokens > max_len {
                report.truncated += 1;
                warn!(index = i, tokens = item.input_tokens, max_len, "input truncated to model maximum length");
            }
            report.representations.push(item.representation);
        }
        debug!(
            texts = texts.len(),
            batches = batches.len(),
            parallel = self.parallel,
            ms = start.elapsed().as_millis() as u64,
            "embedded"
        );
        Ok(report)
    }
}

/// Chunk budgets are measured with the same tokenizer that embeds the chunks.
impl TokenCounter for DualEmbedder {
    fn count_tokens(&self, text: &str) -> usize { self.model.count_tokens(text) }
}
