//! BGE reranker (XLM-RoBERTa sequence classifier with one logit) on candle.
use anyhow::{anyhow, Result};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaForSequenceClassification};
use std::path::Path;
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use legaldb_core::traits::CrossEncoder;

use crate::tokenize::encode_batch;
use crate::{load_model_config, load_weights};

pub struct BgeReranker {
    model: XLMRobertaForSequenceClassification,
    tokenizer: Tokenizer,
    device: Device,
    max_len: usize,
    batch_size: usize,
    model_id: String,
}

impl BgeReranker {
    pub fn load(model_dir: &Path, device: Device, max_len: usize, batch_size: usize) -> Result<Self> {
        info!(dir = %model_dir.display(), "loading reranker");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config: XLMRobertaConfig = load_model_config(model_dir)?;
        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = XLMRobertaForSequenceClassification::new(1, &config, vb)?;
        let model_id = model_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bge-reranker".to_string());
        Ok(Self { model, tokenizer, device, max_len, batch_size: batch_size.max(1), model_id })
    }

    fn score_batch(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        let pairs: Vec<(&str, &str)> = passages.iter().map(|p| (query, p.as_str())).collect();
        let batch = encode_batch(&self.tokenizer, pairs, self.max_len, &self.device)?;
        let logits = self.model.forward(&batch.input_ids, &batch.attention_mask, &batch.token_type_ids)?;
        let scores = candle_nn::ops::sigmoid(&logits.squeeze(1)?)?;
        Ok(scores.to_device(&Device::Cpu)?.to_vec1()?)
    }
}

impl CrossEncoder for BgeReranker {
    fn model_id(&self) -> &str { &self.model_id }

    fn score_pairs(&self, query: &str, passages: &[String]) -> legaldb_core::Result<Vec<f32>> {
        let start = Instant::now();
        let mut scores = Vec::with_capacity(passages.len());
        for chunk in passages.chunks(self.batch_size) {
            scores.extend(self.score_batch(query, chunk).map_err(legaldb_core::Error::model)?);
        }
        debug!(pairs = passages.len(), ms = start.elapsed().as_millis() as u64, "reranker scored");
        Ok(scores)
    }
}
