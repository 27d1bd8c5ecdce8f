//! Embedding and cross-encoder models behind the core capability traits.
use anyhow::{anyhow, Context, Result};
use candle_core::{Device, Tensor};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use legaldb_core::config::{expand_path, EmbeddingConfig, RerankConfig};
use legaldb_core::traits::{CrossEncoder, Embedder};

pub mod bge_m3;
pub mod device;
pub mod dual;
pub mod fake;
pub mod pool;
pub mod reranker;
pub mod tokenize;

pub use bge_m3::{BgeM3Embedder, BGE_M3_DIM};
pub use dual::{DualEmbedder, EmbedReport};
pub use fake::{FakeCrossEncoder, FakeEmbedder};
pub use reranker::BgeReranker;

fn use_fake_models(configured: bool) -> bool {
    configured
        || std::env::var("APP_USE_FAKE_EMBEDDINGS")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
}

/// BGE-M3 from the configured directory, or the fake model when
/// `embedding.use_fake` or `APP_USE_FAKE_EMBEDDINGS=1` is set.
pub fn get_default_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    if use_fake_models(config.use_fake) {
        info!("using FakeEmbedder");
        return Ok(Arc::new(FakeEmbedder::new(BGE_M3_DIM, config.max_length)));
    }
    let dir = resolve_model_dir(config.model_dir.as_deref(), "APP_MODEL_DIR", "bge-m3")?;
    let model = BgeM3Embedder::load(&dir, device::select_device(), config.max_length, config.query_instruction.clone())?;
    Ok(Arc::new(model))
}

/// The cross-encoder used for second-stage ranking.
pub fn get_default_reranker(config: &RerankConfig, use_fake: bool) -> Result<Arc<dyn CrossEncoder>> {
    if use_fake_models(use_fake) {
        info!("using FakeCrossEncoder");
        return Ok(Arc::new(FakeCrossEncoder));
    }
    let dir = resolve_model_dir(config.model_dir.as_deref(), "APP_RERANKER_DIR", "bge-reranker-v2-m3")?;
    Ok(Arc::new(BgeReranker::load(&dir, device::select_device(), config.max_length, config.batch_size)?))
}

fn resolve_model_dir(configured: Option<&str>, env_key: &str, name: &str) -> Result<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(dir) = configured { candidates.push(expand_path(dir)); }
    if let Ok(dir) = std::env::var(env_key) { candidates.push(expand_path(dir)); }
    candidates.push(Path::new("models").join(name));
    candidates.push(Path::new("../models").join(name));
    for p in candidates {
        if p.exists() {
            info!(dir = %p.display(), "using model dir");
            return Ok(p);
        }
    }
    Err(anyhow!("Could not locate {name} model directory"))
}

pub(crate) fn load_model_config<T: serde::de::DeserializeOwned>(model_dir: &Path) -> Result<T> {
    let path = model_dir.join("config.json");
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    Ok(serde_json::from_str(&raw)?)
}

/// `model.safetensors` when present, otherwise `pytorch_model.bin`.
pub(crate) fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let bin = model_dir.join("pytorch_model.bin");
    let weights = candle_core::pickle::read_all(&bin).with_context(|| format!("reading {}", bin.display()))?;
    Ok(weights.into_iter().collect())
}
