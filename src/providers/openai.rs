//! OpenAI-compatible chat and embeddings provider.
//!
//! Speaks the `/chat/completions`, `/embeddings`, and `/models` endpoints.
//! The same wire format is served by OpenRouter, vLLM, LM Studio, and
//! llama.cpp's server, so one type covers all of them; only the endpoint
//! and tag differ.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::core::ProviderCore;
use super::discovery::ModelFetcher;
use super::http::{build_client, check_response};
use super::traits::Provider;
use crate::config::ProviderConfig;
use crate::types::{
    CompletionRequest, CompletionResponse, EmbeddingRequest, EmbeddingResponse, FinishReason,
    ModelDescriptor, Usage,
};
use crate::{HuginnError, Result};

/// Default base URL for the OpenAI API.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default base URL for OpenRouter.
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

fn builtin_models(tag: &str) -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor::chat("gpt-4o", tag)
            .with_display_name("GPT-4o")
            .with_context_window(128_000),
        ModelDescriptor::chat("gpt-4o-mini", tag)
            .with_display_name("GPT-4o mini")
            .with_context_window(128_000),
        ModelDescriptor::embedding("text-embedding-3-small", tag),
        ModelDescriptor::embedding("text-embedding-3-large", tag),
        ModelDescriptor::embedding("text-embedding-ada-002", tag),
    ]
}

/// Provider for OpenAI and OpenAI-compatible servers.
pub struct OpenAiProvider {
    core: ProviderCore,
    api: OpenAiApi,
}

impl OpenAiProvider {
    /// Build from configuration. The endpoint defaults to OpenAI.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        Self::with_default_endpoint(config, DEFAULT_BASE_URL)
    }

    /// Build an OpenRouter instance; only the default endpoint differs.
    pub fn openrouter(config: ProviderConfig) -> Result<Self> {
        Self::with_default_endpoint(config, OPENROUTER_BASE_URL)
    }

    fn with_default_endpoint(config: ProviderConfig, default_endpoint: &str) -> Result<Self> {
        let builtin = builtin_models(&config.tag);
        let core = ProviderCore::new(config, builtin);
        let api = OpenAiApi {
            http: build_client()?,
            base_url: core.config().endpoint_or(default_endpoint),
            api_key: core.api_key().map(str::to_string),
        };
        Ok(Self { core, api })
    }

    pub fn core(&self) -> &ProviderCore {
        &self.core
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        self.core.name()
    }

    #[instrument(name = "openai.complete", skip(self, request), fields(provider = %self.name()))]
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        self.core.require_api_key()?;
        let model = self
            .core
            .completion_model(request.model.as_deref(), DEFAULT_CHAT_MODEL);
        let body = ChatRequest {
            model: &model,
            messages: request
                .messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stop: request.stop.as_deref(),
        };

        let response = self
            .core
            .execute("complete", || self.api.chat(&body))
            .await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or(HuginnError::EmptyResponse)?;

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            provider: self.name().to_string(),
            model: Some(response.model.unwrap_or(model)),
            usage: response.usage.map(Into::into),
            finish_reason: FinishReason::from_provider(choice.finish_reason.as_deref()),
        })
    }

    #[instrument(name = "openai.embed", skip(self, request), fields(provider = %self.name(), batch = request.input.len()))]
    async fn embed(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse> {
        self.core.require_api_key()?;
        let model = self
            .core
            .embedding_model(request.model.as_deref(), DEFAULT_EMBEDDING_MODEL);
        let body = EmbedRequest {
            model: &model,
            input: &request.input,
            dimensions: request.dimensions,
        };

        let response = self
            .core
            .execute("embed", || self.api.embeddings(&body))
            .await?;

        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        Ok(EmbeddingResponse {
            embeddings: data.into_iter().map(|d| d.embedding).collect(),
            provider: self.name().to_string(),
            model: response.model.unwrap_or(model),
            usage: response.usage.map(Into::into),
        })
    }

    fn supports_embeddings(&self) -> bool {
        true
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>> {
        Ok(self.core.list_models(&self.api).await)
    }

    async fn is_available(&self) -> bool {
        if self.core.api_key().is_none() {
            return false;
        }
        self.core
            .check_availability(|| async { self.api.fetch_model_ids().await.map(|_| ()) })
            .await
    }
}

/// Raw HTTP access to an OpenAI-compatible server.
struct OpenAiApi {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiApi {
    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorize(self.http.post(format!("{}{}", self.base_url, path)))
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorize(self.http.get(format!("{}{}", self.base_url, path)))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn chat(&self, body: &ChatRequest<'_>) -> Result<ChatResponse> {
        let response = self.post("/chat/completions").json(body).send().await?;
        Ok(check_response(response, body.model).await?.json().await?)
    }

    async fn embeddings(&self, body: &EmbedRequest<'_>) -> Result<EmbedResponse> {
        let response = self.post("/embeddings").json(body).send().await?;
        Ok(check_response(response, body.model).await?.json().await?)
    }

    async fn fetch_model_ids(&self) -> Result<Vec<ModelEntry>> {
        let response = self.get("/models").send().await?;
        let list: ModelList = check_response(response, "models").await?.json().await?;
        Ok(list.data)
    }
}

#[async_trait]
impl ModelFetcher for OpenAiApi {
    async fn fetch_models(&self) -> Result<Vec<ModelDescriptor>> {
        // Discovery re-tags descriptors with the instance tag.
        Ok(self
            .fetch_model_ids()
            .await?
            .into_iter()
            .map(|entry| {
                if entry.id.contains("embedding") {
                    ModelDescriptor::embedding(entry.id, "")
                } else {
                    let model = ModelDescriptor::chat(entry.id, "");
                    match entry.context_length {
                        Some(ctx) => model.with_context_window(ctx),
                        None => model,
                    }
                }
            })
            .collect())
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<WireUsage> for Usage {
    fn from(u: WireUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
    /// OpenRouter reports this; OpenAI does not.
    #[serde(default)]
    context_length: Option<usize>,
}
