use std::fmt;

use thiserror::Error;

/// Boundaries between query stages. A deadline is only checked here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Encoding,
    Retrieval,
    Fetch,
    Reranking,
    Citation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Encoding => "encoding",
            Stage::Retrieval => "retrieval",
            Stage::Fetch => "fetch",
            Stage::Reranking => "reranking",
            Stage::Citation => "citation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Model failure: {0}")]
    Model(String),

    #[error("Query timed out before {stage} ({elapsed_ms} ms elapsed, budget {budget_ms} ms)")]
    Timeout { stage: Stage, elapsed_ms: u64, budget_ms: u64 },
}

impl Error {
    pub fn index<E: fmt::Display>(err: E) -> Self {
        Self::IndexUnavailable(err.to_string())
    }

    pub fn model<E: fmt::Display>(err: E) -> Self {
        Self::Model(err.to_string())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
