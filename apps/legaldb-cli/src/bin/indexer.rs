use std::{env, fs, path::PathBuf};

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use legaldb_core::config::{expand_path, Config};
use legaldb_core::loader::DocumentLoader;
use legaldb_hybrid::RetrievalPipeline;

fn main() -> anyhow::Result<()> {
    legaldb_cli::init_tracing();
    let settings = Config::load()?.settings()?;
    let args: Vec<String> = env::args().skip(1).collect();
    let mut data_dir = None;
    let mut limit = None;
    let mut fresh = false;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--fresh" => fresh = true,
            "--limit" => {
                let n = args.get(i + 1).and_then(|v| v.parse::<usize>().ok()).context("--limit requires a number")?;
                limit = Some(n);
                i += 1;
            }
            arg if !arg.starts_with('-') => data_dir = Some(PathBuf::from(arg)),
            other => warn!(flag = other, "ignoring unknown flag"),
        }
        i += 1;
    }
    let data_dir = data_dir.unwrap_or_else(|| expand_path(&settings.index.data_dir));

    let index_dir = expand_path(&settings.index.uri);
    if fresh && index_dir.exists() {
        fs::remove_dir_all(&index_dir).with_context(|| format!("removing {}", index_dir.display()))?;
        info!(path = %index_dir.display(), "removed existing index");
    }

    let loader = limit.map_or_else(DocumentLoader::new, DocumentLoader::with_limit);
    let documents = loader.load_directory(&data_dir)?;
    println!("Data directory: {}", data_dir.display());
    println!("Documents: {}", documents.len());

    let model = legaldb_cli::load_embedder(&settings)?;
    let index = legaldb_cli::open_index(&settings, model.dim())?;
    let pipeline = RetrievalPipeline::new(&settings, model, index.clone(), None)?;

    let pb = ProgressBar::new(documents.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents {msg}")?
            .progress_chars("#>-"),
    );
    let (mut chunks, mut truncated) = (0usize, 0usize);
    for doc in &documents {
        pb.set_message(doc.document_id.clone());
        let report = pipeline
            .index_document(&doc.document_id, &doc.text)
            .with_context(|| format!("indexing {}", doc.path.display()))?;
        chunks += report.chunks_stored;
        truncated += report.truncated;
        pb.inc(1);
    }
    pb.finish_with_message("done");

    println!("Indexed {} chunks from {} documents", chunks, documents.len());
    if truncated > 0 {
        println!("{truncated} chunks were longer than the model's maximum length and were truncated");
    }
    println!("Rows in table '{}': {}", settings.index.table, index.count()?);
    Ok(())
}
