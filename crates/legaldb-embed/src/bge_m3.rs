//! BGE-M3 on candle: CLS-pooled dense vector plus lexical weights from the
//! model's `sparse_linear` head, in one forward pass.
use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use std::path::Path;
use std::time::Instant;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use legaldb_core::traits::{Embedder, Encoded, TokenCounter};
use legaldb_core::types::{DualRepresentation, TextKind};

use crate::pool::{cls_l2, sparse_from_activations};
use crate::tokenize::{encode_batch, token_len};
use crate::{load_model_config, load_weights};

pub const BGE_M3_DIM: usize = 1024;
/// `<s>`, `<pad>`, `</s>`, `<unk>`; never weighted.
const SPECIAL_IDS: [u32; 4] = [0, 1, 2, 3];

pub struct BgeM3Embedder {
    model: XLMRobertaModel,
    sparse_linear: Linear,
    tokenizer: Tokenizer,
    device: Device,
    max_len: usize,
    query_instruction: Option<String>,
    model_id: String,
}

impl BgeM3Embedder {
    pub fn load(model_dir: &Path, device: Device, max_len: usize, query_instruction: Option<String>) -> Result<Self> {
        info!(dir = %model_dir.display(), "loading BGE-M3");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config: XLMRobertaConfig = load_model_config(model_dir)?;

        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;

        let sparse_path = model_dir.join("sparse_linear.pt");
        let sparse: std::collections::HashMap<String, Tensor> = candle_core::pickle::read_all(&sparse_path)
            .with_context(|| format!("reading sparse head {}", sparse_path.display()))?
            .into_iter()
            .collect();
        let weight = sparse.get("weight").ok_or_else(|| anyhow!("sparse_linear.pt has no 'weight'"))?;
        let weight = weight.to_dtype(DType::F32)?.to_device(&device)?;
        let bias = match sparse.get("bias") {
            Some(b) => Some(b.to_dtype(DType::F32)?.to_device(&device)?),
            None => None,
        };
        let sparse_linear = Linear::new(weight, bias);

        info!(max_len, "BGE-M3 loaded");
        Ok(Self { model, sparse_linear, tokenizer, device, max_len, query_instruction, model_id: format!("bge-m3:d{BGE_M3_DIM}") })
    }

    fn prepare(&self, text: &str, kind: TextKind) -> String {
        match (kind, &self.query_instruction) {
            (TextKind::Query, Some(instruction)) => format!("{instruction}{text}"),
            _ => text.to_string(),
        }
    }

    fn forward(&self, texts: &[String], kind: TextKind) -> Result<Vec<Encoded>> {
        let start = Instant::now();
        let prepared: Vec<String> = texts.iter().map(|t| self.prepare(t, kind)).collect();
        let inputs: Vec<&str> = prepared.iter().map(String::as_str).collect();
        let batch = encode_batch(&self.tokenizer, inputs, self.max_len, &self.device)?;

        let hidden = self.model.forward(&batch.input_ids, &batch.attention_mask, &batch.token_type_ids, None, None, None)?;
        let dense: Vec<Vec<f32>> = cls_l2(&hidden)?.to_device(&Device::Cpu)?.to_vec2()?;
        let activations: Vec<Vec<f32>> = self
            .sparse_linear
            .forward(&hidden)?
            .relu()?
            .squeeze(2)?
            .to_device(&Device::Cpu)?
            .to_vec2()?;
        let sparse = sparse_from_activations(&activations, &batch.ids, &SPECIAL_IDS);

        let out = dense
            .into_iter()
            .zip(sparse)
            .zip(batch.input_tokens)
            .map(|((dense, sparse), input_tokens)| Encoded { representation: DualRepresentation::new(dense, sparse), input_tokens })
            .collect::<Vec<_>>();
        debug!(batch = texts.len(), ms = start.elapsed().as_millis() as u64, "BGE-M3 batch encoded");
        Ok(out)
    }
}

impl TokenCounter for BgeM3Embedder {
    fn count_tokens(&self, text: &str) -> usize {
        match token_len(&self.tokenizer, text) {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "tokenizer failed; counting words instead");
                text.split_whitespace().count()
            }
        }
    }
}

impl Embedder for BgeM3Embedder {
    fn model_id(&self) -> &str { &self.model_id }
    fn dim(&self) -> usize { BGE_M3_DIM }
    fn max_len(&self) -> usize { self.max_len }

    fn embed_batch(&self, texts: &[String], kind: TextKind) -> legaldb_core::Result<Vec<Encoded>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.forward(texts, kind).map_err(legaldb_core::Error::model)
    }
}
