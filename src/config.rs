//! TOML configuration.
//!
//! Every field has a default, so an empty file (or no file at all) gives the
//! stock setup: `.txt` files from `./data`, Gemini embeddings and
//! generation, top-3 retrieval, and the built-in conflict-aware prompt.
//!
//! ```toml
//! [data]
//! dir = "data"
//!
//! [retrieval]
//! top_k = 3
//!
//! [embedding]
//! provider = "gemini"
//! model = "models/text-embedding-004"
//!
//! [llm]
//! provider = "gemini"
//! model = "gemini-2.5-flash"
//! temperature = 0.0
//! ```
//!
//! API keys are never read from this file by default: providers look them
//! up in the environment (`GOOGLE_API_KEY`, `OPENAI_API_KEY`), which the
//! CLI pre-populates from a `.env` file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use conflict_rag_core::retrieve::{GroupBy, RetrievalParams};
use conflict_rag_core::store::memory::DEFAULT_COLLECTION;

pub const DEFAULT_QUESTION: &str = "I just joined as a new intern. Can I work from home?";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_include_globs() -> Vec<String> {
    vec!["*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default)]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: 0,
        }
    }
}

fn default_max_tokens() -> usize {
    700
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
    #[serde(default)]
    pub group_by: GroupBy,
    #[serde(default = "default_max_chunks_per_doc")]
    pub max_chunks_per_doc: usize,
    #[serde(default)]
    pub min_score: Option<f64>,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            candidate_k: default_candidate_k(),
            group_by: GroupBy::Document,
            max_chunks_per_doc: default_max_chunks_per_doc(),
            min_score: None,
            collection: default_collection(),
        }
    }
}

impl RetrievalConfig {
    pub fn params(&self) -> RetrievalParams {
        RetrievalParams {
            top_k: self.top_k,
            candidate_k: self.candidate_k,
            group_by: self.group_by,
            max_chunks_per_doc: self.max_chunks_per_doc,
            min_score: self.min_score,
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_candidate_k() -> usize {
    20
}
fn default_max_chunks_per_doc() -> usize {
    3
}
fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (e.g. a proxy or a local Ollama).
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            api_key_env: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    /// Configured model, or the provider's default.
    pub fn model_or_default(&self) -> String {
        if let Some(model) = &self.model {
            return model.clone();
        }
        match self.provider.as_str() {
            "openai" => "text-embedding-3-small",
            "ollama" => "nomic-embed-text",
            _ => "models/text-embedding-004",
        }
        .to_string()
    }

    pub fn api_key_var(&self) -> Option<String> {
        self.api_key_env
            .clone()
            .or_else(|| default_api_key_var(&self.provider).map(String::from))
    }
}

fn default_embedding_provider() -> String {
    "gemini".to_string()
}
fn default_batch_size() -> usize {
    100
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            temperature: 0.0,
            max_output_tokens: None,
            url: None,
            api_key_env: None,
            max_retries: default_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn model_or_default(&self) -> String {
        if let Some(model) = &self.model {
            return model.clone();
        }
        match self.provider.as_str() {
            "openai" => "gpt-4o-mini",
            "ollama" => "llama3.1",
            _ => "gemini-2.5-flash",
        }
        .to_string()
    }

    pub fn api_key_var(&self) -> Option<String> {
        self.api_key_env
            .clone()
            .or_else(|| default_api_key_var(&self.provider).map(String::from))
    }
}

fn default_llm_provider() -> String {
    "gemini".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    120
}

fn default_api_key_var(provider: &str) -> Option<&'static str> {
    match provider {
        "gemini" => Some("GOOGLE_API_KEY"),
        "openai" => Some("OPENAI_API_KEY"),
        _ => None,
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PromptConfig {
    /// File replacing the built-in template. Must contain `{context}` and `{question}`.
    #[serde(default)]
    pub template_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_question")]
    pub default_question: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_question: default_question(),
        }
    }
}

fn default_question() -> String {
    DEFAULT_QUESTION.to_string()
}

/// Read and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists; fall back to defaults only when `path` was
/// not given explicitly.
pub fn resolve_config(path: &Path, explicit: bool) -> Result<Config> {
    if !explicit && !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::default());
    }
    load_config(path)
}

/// Read an API key from the environment variable `var`.
pub fn api_key_from_env(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => bail!("{} not found. Set it in the environment or in a .env file.", var),
    }
}

pub fn validate(config: &Config) -> Result<()> {
    if config.data.include_globs.is_empty() {
        bail!("data.include_globs must not be empty");
    }

    if config.chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }
    if config.chunking.overlap_tokens >= config.chunking.max_tokens {
        bail!("chunking.overlap_tokens must be < chunking.max_tokens");
    }

    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.max_chunks_per_doc == 0 {
        bail!("retrieval.max_chunks_per_doc must be >= 1");
    }
    if let Some(min) = config.retrieval.min_score {
        if !(-1.0..=1.0).contains(&min) {
            bail!("retrieval.min_score must be in [-1.0, 1.0]");
        }
    }
    if config.retrieval.collection.trim().is_empty() {
        bail!("retrieval.collection must not be empty");
    }

    match config.embedding.provider.as_str() {
        "gemini" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be gemini, openai, or ollama.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0 when set");
    }

    match config.llm.provider.as_str() {
        "gemini" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be gemini, openai, or ollama.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        bail!("llm.temperature must be in [0.0, 2.0]");
    }

    if config.query.default_question.trim().is_empty() {
        bail!("query.default_question must not be empty");
    }

    Ok(())
}
