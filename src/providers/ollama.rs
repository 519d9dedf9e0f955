//! Ollama provider for locally served chat and embedding models.
//!
//! No credential is needed; availability is a `GET /api/tags` probe.

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

/// Default local Ollama endpoint.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

const DEFAULT_CHAT_MODEL: &str = "llama3.2";
const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

fn builtin_models(tag: &str) -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor::chat("llama3.2", tag),
        ModelDescriptor::embedding("nomic-embed-text", tag),
        ModelDescriptor::embedding("mxbai-embed-large", tag),
    ]
}

pub struct OllamaProvider {
    core: ProviderCore,
    api: OllamaApi,
}

impl OllamaProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let builtin = builtin_models(&config.tag);
        let core = ProviderCore::new(config, builtin);
        let api = OllamaApi {
            http: build_client()?,
            base_url: core.config().endpoint_or(DEFAULT_BASE_URL),
        };
        Ok(Self { core, api })
    }

    pub fn core(&self) -> &ProviderCore {
        &self.core
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        self.core.name()
    }

    #[instrument(name = "ollama.complete", skip(self, request), fields(provider = %self.name()))]
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let model = self
            .core
            .completion_model(request.model.as_deref(), DEFAULT_CHAT_MODEL);
        let body = ChatRequest {
            model: &model,
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            stream: false,
            options: ChatOptions {
                num_predict: request.max_tokens,
                temperature: request.temperature,
                stop: request.stop.as_deref(),
            },
        };

        let response = self
            .core
            .execute("complete", || self.api.chat(&body))
            .await?;
        let message = response.message.ok_or(HuginnError::EmptyResponse)?;

        let prompt_tokens = response.prompt_eval_count.unwrap_or(0);
        let completion_tokens = response.eval_count.unwrap_or(0);
        Ok(CompletionResponse {
            content: message.content,
            provider: self.name().to_string(),
            model: Some(response.model.unwrap_or(model)),
            usage: Some(Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            }),
            finish_reason: FinishReason::from_provider(response.done_reason.as_deref()),
        })
    }

    #[instrument(name = "ollama.embed", skip(self, request), fields(provider = %self.name(), batch = request.input.len()))]
    async fn embed(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse> {
        let model = self
            .core
            .embedding_model(request.model.as_deref(), DEFAULT_EMBEDDING_MODEL);
        let body = EmbedRequest {
            model: &model,
            input: &request.input,
        };

        let response = self
            .core
            .execute("embed", || self.api.embed(&body))
            .await?;

        Ok(EmbeddingResponse {
            embeddings: response.embeddings,
            provider: self.name().to_string(),
            model: response.model.unwrap_or(model),
            usage: response.prompt_eval_count.map(|n| Usage {
                prompt_tokens: n,
                completion_tokens: 0,
                total_tokens: n,
            }),
        })
    }

    fn supports_embeddings(&self) -> bool {
        true
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>> {
        Ok(self.core.list_models(&self.api).await)
    }

    async fn is_available(&self) -> bool {
        self.core
            .check_availability(|| async { self.api.tags().await.map(|_| ()) })
            .await
    }
}

struct OllamaApi {
    http: Client,
    base_url: String,
}

impl OllamaApi {
    async fn chat(&self, body: &ChatRequest<'_>) -> Result<ChatResponse> {
        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(body)
            .send()
            .await?;
        Ok(check_response(response, body.model).await?.json().await?)
    }

    async fn embed(&self, body: &EmbedRequest<'_>) -> Result<EmbedResponse> {
        let response = self
            .http
            .post(format!("{}/api/embed", self.base_url))
            .json(body)
            .send()
            .await?;
        Ok(check_response(response, body.model).await?.json().await?)
    }

    async fn tags(&self) -> Result<Vec<TagEntry>> {
        let response = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?;
        let tags: TagList = check_response(response, "tags").await?.json().await?;
        Ok(tags.models)
    }
}

#[async_trait]
impl ModelFetcher for OllamaApi {
    async fn fetch_models(&self) -> Result<Vec<ModelDescriptor>> {
        Ok(self
            .tags()
            .await?
            .into_iter()
            .map(|tag| {
                let is_embedding = tag.name.contains("embed")
                    || tag
                        .details
                        .as_ref()
                        .and_then(|d| d.family.as_deref())
                        .is_some_and(|f| f.contains("bert"));
                if is_embedding {
                    ModelDescriptor::embedding(tag.name, "")
                } else {
                    ModelDescriptor::chat(tag.name, "")
                }
            })
            .collect())
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    options: ChatOptions<'a>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    model: Option<String>,
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct TagList {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
    #[serde(default)]
    details: Option<TagDetails>,
}

#[derive(Deserialize)]
struct TagDetails {
    #[serde(default)]
    family: Option<String>,
}
