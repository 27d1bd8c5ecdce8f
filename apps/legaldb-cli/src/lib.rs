//! Wiring shared by the `legaldb-indexer` and `legaldb-query` binaries.
use std::sync::Arc;

use anyhow::Context;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use legaldb_core::config::{expand_path, Settings};
use legaldb_core::traits::{CrossEncoder, Embedder};
use legaldb_vector::LanceIndex;

/// Logs to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

pub fn open_index(settings: &Settings, dim: usize) -> anyhow::Result<Arc<LanceIndex>> {
    let uri = expand_path(&settings.index.uri);
    std::fs::create_dir_all(&uri).with_context(|| format!("creating index directory {}", uri.display()))?;
    let index = LanceIndex::open(&uri.to_string_lossy(), &settings.index.table, dim)
        .with_context(|| format!("opening table '{}' at {}", settings.index.table, uri.display()))?;
    Ok(Arc::new(index))
}

pub fn load_embedder(settings: &Settings) -> anyhow::Result<Arc<dyn Embedder>> {
    legaldb_embed::get_default_embedder(&settings.embedding).context("loading embedding model")
}

/// `None` when reranking is off or the model cannot be loaded; queries then
/// report a skipped or degraded rerank instead of failing.
pub fn load_cross_encoder(settings: &Settings) -> Option<Arc<dyn CrossEncoder>> {
    if !settings.rerank.enabled {
        return None;
    }
    match legaldb_embed::get_default_reranker(&settings.rerank, settings.embedding.use_fake) {
        Ok(model) => Some(model),
        Err(e) => {
            warn!(error = %e, "cross-encoder unavailable, results will use fused order");
            None
        }
    }
}
