//! OpenAI-compatible providers (Hugging Face router, vLLM, OpenAI)

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{EmbeddingConfig, LlmConfig};
use crate::error::{Error, Result};

use super::embedding::EmbeddingProvider;
use super::error::ProviderError;
use super::llm::{ChatMessage, CompletionRequest, LlmProvider};

/// Read an API key from the named environment variable
pub fn api_key_from_env(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(Error::Config(format!(
            "{} is not set. Export your API key, e.g. {}=hf_xxx",
            var, var
        ))),
    }
}

fn build_client(api_key: &str, timeout: Duration) -> Result<Client> {
    let mut headers = HeaderMap::new();
    let auth = format!("Bearer {}", api_key);
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&auth).map_err(|_| Error::Config("invalid API key".into()))?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    Ok(Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()?)
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
    client: &Client,
    url: &str,
    body: &B,
) -> std::result::Result<R, ProviderError> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(ProviderError::from_reqwest)?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        return Err(ProviderError::from_status(status, &text));
    }

    response.json().await.map_err(ProviderError::from_reqwest)
}

/// Chat completions over `POST {base_url}/chat/completions`
pub struct OpenAiCompatLlm {
    client: Client,
    base_url: String,
    model: String,
}

impl OpenAiCompatLlm {
    /// Create a provider, reading the API key from `config.api_key_env`
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = api_key_from_env(&config.api_key_env)?;
        Ok(Self {
            client: build_client(&api_key, config.timeout())?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatLlm {
    async fn complete(&self, request: &CompletionRequest) -> std::result::Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
        };

        let parsed: ChatResponse = post_json(&self.client, &url, &body).await?;

        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::Unknown {
                kind: "EmptyCompletion".to_string(),
                message: "provider returned no choices".to_string(),
            })
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Embeddings over `POST {base_url}/embeddings`
pub struct OpenAiCompatEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl OpenAiCompatEmbedder {
    /// Create an embedder; `api_key_env` is required for this provider
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let var = config.api_key_env.as_deref().ok_or_else(|| {
            Error::Config("embeddings.api_key_env is required for openai_compatible".into())
        })?;
        let api_key = api_key_from_env(var)?;
        Ok(Self {
            client: build_client(&api_key, config.timeout())?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dimensions: config.dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatEmbedder {
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = EmbeddingsRequest { model: &self.model, input: text };

        let parsed: EmbeddingsResponse = post_json(&self.client, &url, &body).await?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::Unknown {
                kind: "EmptyEmbedding".to_string(),
                message: "provider returned no embedding".to_string(),
            })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}
