//! Layered configuration loader, typed retrieval settings and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nested keys, e.g. `APP_FUSION__MODE=rrf`).
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?;
        Ok(config)
    }

    /// Defaults overlaid with an inline TOML document. Used by tests and tools.
    pub fn from_toml_str(toml: &str) -> Self {
        Self { figment: Figment::from(Serialized::defaults(Settings::default())).merge(Toml::string(toml)) }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    /// The full typed settings, validated.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub fusion: FusionConfig,
    pub rerank: RerankConfig,
    pub citation: CitationConfig,
    pub query: QueryConfig,
    pub index: IndexConfig,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));

        if self.chunking.max_tokens == 0 {
            return invalid("chunking.max_tokens must be at least 1".into());
        }
        if self.chunking.max_tokens > self.embedding.max_length {
            return invalid(format!(
                "chunking.max_tokens ({}) exceeds embedding.max_length ({})",
                self.chunking.max_tokens, self.embedding.max_length
            ));
        }
        if self.embedding.batch_size == 0 {
            return invalid("embedding.batch_size must be at least 1".into());
        }
        self.fusion.validate()?;
        if self.rerank.top_k == 0 || self.rerank.top_n == 0 {
            return invalid("rerank.top_k and rerank.top_n must be at least 1".into());
        }
        if self.rerank.batch_size == 0 {
            return invalid("rerank.batch_size must be at least 1".into());
        }
        if self.citation.preview_chars == 0 {
            return invalid("citation.preview_chars must be at least 1".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Upper bound on `Chunk::token_count`, header included.
    pub max_tokens: usize,
    /// Sentences repeated at the start of the next part when a clause is split.
    pub overlap_sentences: usize,
    /// Prefix each chunk with "Document > Chapter > Article".
    pub include_parent_path: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_tokens: 1024, overlap_sentences: 0, include_parent_path: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model_dir: Option<String>,
    pub max_length: usize,
    pub batch_size: usize,
    pub parallel_batches: bool,
    pub use_fake: bool,
    pub query_instruction: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_dir: None,
            max_length: 1024,
            batch_size: 4,
            parallel_batches: false,
            use_fake: false,
            query_instruction: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionMode {
    /// Min-max normalised weighted sum of dense and sparse scores.
    #[default]
    Weighted,
    /// Reciprocal rank fusion.
    Rrf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub mode: FusionMode,
    pub dense_weight: f32,
    pub sparse_weight: f32,
    pub rrf_k: u32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self { mode: FusionMode::Weighted, dense_weight: 0.5, sparse_weight: 0.5, rrf_k: 60 }
    }
}

impl FusionConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, w) in [("dense_weight", self.dense_weight), ("sparse_weight", self.sparse_weight)] {
            if !w.is_finite() || !(0.0..=1.0).contains(&w) {
                return Err(Error::InvalidConfig(format!("fusion.{name} must be within [0, 1], got {w}")));
            }
        }
        let sum = self.dense_weight + self.sparse_weight;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(Error::InvalidConfig(format!("fusion weights must sum to 1, got {sum}")));
        }
        if self.rrf_k == 0 {
            return Err(Error::InvalidConfig("fusion.rrf_k must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub enabled: bool,
    pub model_dir: Option<String>,
    pub top_k: usize,
    pub top_n: usize,
    pub batch_size: usize,
    pub max_length: usize,
    pub max_passage_chars: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_dir: None,
            top_k: 100,
            top_n: 5,
            batch_size: 64,
            max_length: 512,
            max_passage_chars: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CitationConfig {
    pub preview_chars: usize,
}

impl Default for CitationConfig {
    fn default() -> Self { Self { preview_chars: 200 } }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub uri: String,
    pub table: String,
    pub data_dir: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            uri: "data/indexes/lancedb".to_string(),
            table: "legal_chunks".to_string(),
            data_dir: "data/txt".to_string(),
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().expect("default settings validate");
        assert_eq!(settings.fusion.mode, FusionMode::Weighted);
        assert_eq!(settings.fusion.rrf_k, 60);
        assert_eq!(settings.citation.preview_chars, 200);
    }

    #[test]
    fn toml_overrides_merge_over_defaults() {
        let config = Config::from_toml_str(
            r#"
            [fusion]
            mode = "rrf"
            dense_weight = 0.7
            sparse_weight = 0.3

            [rerank]
            top_n = 3
            "#,
        );
        let settings = config.settings().expect("settings");
        assert_eq!(settings.fusion.mode, FusionMode::Rrf);
        assert!((settings.fusion.dense_weight - 0.7).abs() < 1e-6);
        assert_eq!(settings.rerank.top_n, 3);
        assert_eq!(settings.rerank.top_k, 100, "untouched keys keep their default");
        let k: u32 = config.get("fusion.rrf_k").expect("rrf_k");
        assert_eq!(k, 60);
    }

    #[test]
    fn weights_must_sum_to_one() {
        let config = Config::from_toml_str("[fusion]\ndense_weight = 0.6\nsparse_weight = 0.6\n");
        assert!(matches!(config.settings(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn chunk_budget_cannot_exceed_model_length() {
        let mut settings = Settings::default();
        settings.chunking.max_tokens = settings.embedding.max_length + 1;
        assert!(settings.validate().is_err());
    }
}
