//! Embedding providers.
//!
//! Concrete [`Embedder`] implementations for hosted and local HTTP APIs:
//! - **[`GeminiEmbedder`]**: Google Generative Language `batchEmbedContents`.
//! - **[`OpenAIEmbedder`]**: OpenAI `POST /v1/embeddings`.
//! - **[`OllamaEmbedder`]**: a local Ollama instance's `/api/embed`.
//!
//! Every provider sends texts in batches of `batch_size`, retries transient
//! failures (see [`crate::http`]), and checks that the response holds one
//! vector per input (and `dims` values per vector when `dims` is set).
//!
//! # Provider Selection
//!
//! Use [`create_embedder`] to build the provider named in the config. The
//! API key is read from the environment variable named by
//! [`EmbeddingConfig::api_key_var`].

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use conflict_rag_core::embedding::{EmbedKind, Embedder};

use crate::config::{api_key_from_env, EmbeddingConfig};
use crate::http::{build_client, join_url, post_json};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Build the embedding provider named by `config.provider`.
///
/// # Errors
///
/// Returns an error for unknown provider names or when the provider's API
/// key is not set.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "gemini" => {
            let key = api_key_from_env(&key_var(config)?)?;
            Ok(Box::new(GeminiEmbedder::new(config, key)?))
        }
        "openai" => {
            let key = api_key_from_env(&key_var(config)?)?;
            Ok(Box::new(OpenAIEmbedder::new(config, key)?))
        }
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

fn key_var(config: &EmbeddingConfig) -> Result<String> {
    config
        .api_key_var()
        .ok_or_else(|| anyhow!("embedding.api_key_env required for {}", config.provider))
}

/// Settings common to every HTTP embedder.
struct HttpSettings {
    client: reqwest::Client,
    model: String,
    dims: Option<usize>,
    url: String,
    batch_size: usize,
    max_retries: u32,
}

impl HttpSettings {
    fn new(config: &EmbeddingConfig, default_url: &str) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            model: config.model_or_default(),
            dims: config.dims,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| default_url.to_string()),
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
        })
    }
}

/// Check one response batch against its request.
fn check_vectors(
    service: &str,
    expected: usize,
    vectors: &[Vec<f32>],
    dims: Option<usize>,
) -> Result<()> {
    if vectors.len() != expected {
        bail!(
            "{} returned {} embeddings for {} inputs",
            service,
            vectors.len(),
            expected
        );
    }
    if let Some(dims) = dims {
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            bail!(
                "{} returned a {}-dimensional embedding, expected {}",
                service,
                bad.len(),
                dims
            );
        }
    }
    Ok(())
}

fn json_to_vec(values: &serde_json::Value) -> Option<Vec<f32>> {
    values
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

// ============ Gemini ============

/// Embedding provider for the Google Generative Language API.
///
/// Calls `POST {url}/v1beta/{model}:batchEmbedContents`. Stored passages are
/// embedded with task type `RETRIEVAL_DOCUMENT`, questions with
/// `RETRIEVAL_QUERY`.
pub struct GeminiEmbedder {
    http: HttpSettings,
    api_key: String,
}

impl GeminiEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let mut http = HttpSettings::new(config, GEMINI_BASE_URL)?;
        if !http.model.starts_with("models/") {
            http.model = format!("models/{}", http.model);
        }
        Ok(Self { http, api_key })
    }

    fn request_body(&self, texts: &[String], kind: EmbedKind) -> serde_json::Value {
        let task_type = match kind {
            EmbedKind::Document => "RETRIEVAL_DOCUMENT",
            EmbedKind::Query => "RETRIEVAL_QUERY",
        };
        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|text| {
                let mut req = serde_json::json!({
                    "model": self.http.model,
                    "content": { "parts": [{ "text": text }] },
                    "taskType": task_type,
                });
                if let Some(dims) = self.http.dims {
                    req["outputDimensionality"] = serde_json::json!(dims);
                }
                req
            })
            .collect();
        serde_json::json!({ "requests": requests })
    }

    async fn embed_batch(&self, texts: &[String], kind: EmbedKind) -> Result<Vec<Vec<f32>>> {
        let url = join_url(
            &self.http.url,
            &format!("v1beta/{}:batchEmbedContents", self.http.model),
        );
        let json = post_json(
            &self.http.client,
            "Gemini",
            &url,
            &[("x-goog-api-key", self.api_key.clone())],
            &self.request_body(texts, kind),
            self.http.max_retries,
        )
        .await?;
        let vectors = parse_gemini_response(&json)?;
        check_vectors("Gemini", texts.len(), &vectors, self.http.dims)?;
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model_name(&self) -> &str {
        &self.http.model
    }
    fn dims(&self) -> usize {
        self.http.dims.unwrap_or(0)
    }
    async fn embed(&self, texts: &[String], kind: EmbedKind) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.http.batch_size) {
            out.extend(self.embed_batch(batch, kind).await?);
        }
        Ok(out)
    }
}

/// Extract `embeddings[].values` from a `batchEmbedContents` response.
fn parse_gemini_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let items = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Gemini response: missing embeddings array"))?;

    items
        .iter()
        .map(|item| {
            item.get("values")
                .and_then(json_to_vec)
                .ok_or_else(|| anyhow!("Invalid Gemini response: missing embedding values"))
        })
        .collect()
}

// ============ OpenAI ============

/// Embedding provider for the OpenAI API (`POST {url}/v1/embeddings`).
pub struct OpenAIEmbedder {
    http: HttpSettings,
    api_key: String,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            http: HttpSettings::new(config, OPENAI_BASE_URL)?,
            api_key,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut body = serde_json::json!({
            "model": self.http.model,
            "input": texts,
        });
        if let Some(dims) = self.http.dims {
            body["dimensions"] = serde_json::json!(dims);
        }
        let json = post_json(
            &self.http.client,
            "OpenAI",
            &join_url(&self.http.url, "v1/embeddings"),
            &[("Authorization", format!("Bearer {}", self.api_key))],
            &body,
            self.http.max_retries,
        )
        .await?;
        let vectors = parse_openai_response(&json)?;
        check_vectors("OpenAI", texts.len(), &vectors, self.http.dims)?;
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.http.model
    }
    fn dims(&self) -> usize {
        self.http.dims.unwrap_or(0)
    }
    async fn embed(&self, texts: &[String], _kind: EmbedKind) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.http.batch_size) {
            out.extend(self.embed_batch(batch).await?);
        }
        Ok(out)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let embedding = item
            .get("embedding")
            .and_then(json_to_vec)
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        indexed.push((index, embedding));
    }
    indexed.sort_by_key(|(i, _)| *i);

    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Embedding provider for a local Ollama instance (`POST {url}/api/embed`).
///
/// Requires Ollama to be running with an embedding model pulled
/// (e.g. `ollama pull nomic-embed-text`). No API key.
pub struct OllamaEmbedder {
    http: HttpSettings,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            http: HttpSettings::new(config, OLLAMA_BASE_URL)?,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.http.model,
            "input": texts,
        });
        let json = post_json(
            &self.http.client,
            "Ollama",
            &join_url(&self.http.url, "api/embed"),
            &[],
            &body,
            self.http.max_retries,
        )
        .await?;
        let vectors = parse_ollama_response(&json)?;
        check_vectors("Ollama", texts.len(), &vectors, self.http.dims)?;
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.http.model
    }
    fn dims(&self) -> usize {
        self.http.dims.unwrap_or(0)
    }
    async fn embed(&self, texts: &[String], _kind: EmbedKind) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.http.batch_size) {
            out.extend(self.embed_batch(batch).await?);
        }
        Ok(out)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|e| json_to_vec(e).ok_or_else(|| anyhow!("Invalid Ollama response: bad embedding")))
        .collect()
}
