use std::env;
use std::process::ExitCode;

use legaldb_core::config::Config;
use legaldb_core::Error;
use legaldb_hybrid::{RerankStatus, RetrievalPipeline};

fn main() -> anyhow::Result<ExitCode> {
    legaldb_cli::init_tracing();
    let mut settings = Config::load()?.settings()?;
    let args: Vec<String> = env::args().skip(1).collect();
    let mut words = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--no-rerank" => settings.rerank.enabled = false,
            "--top-n" | "--top-k" | "--timeout-ms" => {
                let flag = args[i].as_str();
                let Some(n) = args.get(i + 1).and_then(|v| v.parse::<usize>().ok()) else {
                    eprintln!("Error: {flag} requires a number");
                    return Ok(ExitCode::from(1));
                };
                match flag {
                    "--top-n" => settings.rerank.top_n = n,
                    "--top-k" => settings.rerank.top_k = n,
                    _ => settings.query.timeout_ms = Some(n as u64),
                }
                i += 1;
            }
            other => words.push(other.to_string()),
        }
        i += 1;
    }
    if words.is_empty() {
        eprintln!("Usage: legaldb-query [--no-rerank] [--top-k N] [--top-n N] [--timeout-ms N] <query>");
        eprintln!("Example: legaldb-query 'chiều cao tối thiểu của tầng 1'");
        return Ok(ExitCode::from(1));
    }
    let query = words.join(" ");

    let model = legaldb_cli::load_embedder(&settings)?;
    let index = legaldb_cli::open_index(&settings, model.dim())?;
    let cross_encoder = legaldb_cli::load_cross_encoder(&settings);
    let pipeline = RetrievalPipeline::new(&settings, model, index, cross_encoder)?;

    let outcome = match pipeline.retrieve(&query) {
        Ok(outcome) => outcome,
        Err(e @ Error::Timeout { .. }) => {
            eprintln!("{e}");
            return Ok(ExitCode::from(2));
        }
        Err(e) => return Err(e.into()),
    };

    println!("Query: {query}");
    if let RerankStatus::Degraded { reason } = &outcome.status {
        println!("Reranking unavailable ({reason}); showing fused ranking");
    }
    if outcome.is_empty() {
        println!("No passages found.");
        return Ok(ExitCode::SUCCESS);
    }
    for (passage, result) in outcome.passages().iter().zip(&outcome.results) {
        println!("\n{}. {} score={:.4} page={}", passage.rank, passage.citation.locator, result.rerank_score, passage.citation.page_number);
        println!("   {}{}", passage.citation.text_preview.replace('\n', " "), if passage.citation.preview_truncated { "…" } else { "" });
    }
    let s = &outcome.stats;
    println!(
        "\n{} candidates, rerank {} | encoding {} ms, retrieval {} ms, reranking {} ms, total {} ms",
        s.candidates, outcome.status, s.encoding_ms, s.retrieval_ms, s.reranking_ms, s.total_ms
    );
    Ok(ExitCode::SUCCESS)
}
