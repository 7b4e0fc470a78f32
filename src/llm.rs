//! Text generation providers.
//!
//! A [`ChatModel`] takes a fully rendered prompt and returns the model's
//! answer as plain text. Implementations:
//! - **[`GeminiChat`]**: `POST {url}/v1beta/models/{model}:generateContent`
//! - **[`OpenAIChat`]**: `POST {url}/v1/chat/completions`
//! - **[`OllamaChat`]**: `POST {url}/api/generate` with `stream: false`
//!
//! All three share the retry policy in [`crate::http`].

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::config::{api_key_from_env, LlmConfig};
use crate::embedding::{GEMINI_BASE_URL, OLLAMA_BASE_URL, OPENAI_BASE_URL};
use crate::http::{build_client, join_url, post_json};

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Generate a single answer for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Build the chat model named by `config.provider`.
pub fn create_chat_model(config: &LlmConfig) -> Result<Box<dyn ChatModel>> {
    match config.provider.as_str() {
        "gemini" => Ok(Box::new(GeminiChat::new(config, provider_key(config)?)?)),
        "openai" => Ok(Box::new(OpenAIChat::new(config, provider_key(config)?)?)),
        "ollama" => Ok(Box::new(OllamaChat::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

fn provider_key(config: &LlmConfig) -> Result<String> {
    let var = config
        .api_key_var()
        .ok_or_else(|| anyhow!("llm.api_key_env required for {}", config.provider))?;
    api_key_from_env(&var)
}

struct HttpSettings {
    client: reqwest::Client,
    model: String,
    url: String,
    temperature: f32,
    max_output_tokens: Option<u32>,
    max_retries: u32,
}

impl HttpSettings {
    fn new(config: &LlmConfig, default_url: &str) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            model: config.model_or_default(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| default_url.to_string()),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            max_retries: config.max_retries,
        })
    }
}

// ============ Gemini ============

pub struct GeminiChat {
    http: HttpSettings,
    api_key: String,
}

impl GeminiChat {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        let mut http = HttpSettings::new(config, GEMINI_BASE_URL)?;
        if let Some(bare) = http.model.strip_prefix("models/") {
            http.model = bare.to_string();
        }
        Ok(Self { http, api_key })
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        let mut generation_config = serde_json::json!({ "temperature": self.http.temperature });
        if let Some(max) = self.http.max_output_tokens {
            generation_config["maxOutputTokens"] = serde_json::json!(max);
        }
        serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": generation_config,
        })
    }
}

#[async_trait]
impl ChatModel for GeminiChat {
    fn model_name(&self) -> &str {
        &self.http.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = join_url(
            &self.http.url,
            &format!("v1beta/models/{}:generateContent", self.http.model),
        );
        let json = post_json(
            &self.http.client,
            "Gemini",
            &url,
            &[("x-goog-api-key", self.api_key.clone())],
            &self.request_body(prompt),
            self.http.max_retries,
        )
        .await?;
        parse_gemini_response(&json)
    }
}

/// Concatenate the first candidate's text parts.
fn parse_gemini_response(json: &serde_json::Value) -> Result<String> {
    let candidate = match json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
    {
        Some(c) => c,
        None => {
            if let Some(reason) = json
                .pointer("/promptFeedback/blockReason")
                .and_then(|r| r.as_str())
            {
                bail!("Gemini blocked the prompt: {}", reason);
            }
            bail!("Invalid Gemini response: no candidates");
        }
    };

    let text: String = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate
            .get("finishReason")
            .and_then(|r| r.as_str())
            .unwrap_or("UNKNOWN");
        bail!("Gemini returned no text (finishReason: {})", reason);
    }

    Ok(text)
}

// ============ OpenAI ============

pub struct OpenAIChat {
    http: HttpSettings,
    api_key: String,
}

impl OpenAIChat {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            http: HttpSettings::new(config, OPENAI_BASE_URL)?,
            api_key,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.http.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.http.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.http.temperature,
        });
        if let Some(max) = self.http.max_output_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        let json = post_json(
            &self.http.client,
            "OpenAI",
            &join_url(&self.http.url, "v1/chat/completions"),
            &[("Authorization", format!("Bearer {}", self.api_key))],
            &body,
            self.http.max_retries,
        )
        .await?;
        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(String::from)
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
    }
}

// ============ Ollama ============

pub struct OllamaChat {
    http: HttpSettings,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            http: HttpSettings::new(config, OLLAMA_BASE_URL)?,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.http.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut options = serde_json::json!({ "temperature": self.http.temperature });
        if let Some(max) = self.http.max_output_tokens {
            options["num_predict"] = serde_json::json!(max);
        }
        let body = serde_json::json!({
            "model": self.http.model,
            "prompt": prompt,
            "stream": false,
            "options": options,
        });
        let json = post_json(
            &self.http.client,
            "Ollama",
            &join_url(&self.http.url, "api/generate"),
            &[],
            &body,
            self.http.max_retries,
        )
        .await?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(String::from)
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing response"))
    }
}
