//! Anthropic Messages API provider.
//!
//! Completions only: Anthropic offers no embeddings endpoint, so
//! [`Provider::embed()`] keeps its `Unsupported` default and the gateway
//! skips this provider for embedding requests.

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
    CompletionRequest, CompletionResponse, FinishReason, ModelDescriptor, Role, Usage,
};
use crate::{HuginnError, Result};

/// Default base URL for the Anthropic API.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
/// The Messages API requires `max_tokens`.
const DEFAULT_MAX_TOKENS: u32 = 1024;

fn builtin_models(tag: &str) -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor::chat("claude-3-5-sonnet-latest", tag)
            .with_display_name("Claude 3.5 Sonnet")
            .with_context_window(200_000),
        ModelDescriptor::chat("claude-3-5-haiku-latest", tag)
            .with_display_name("Claude 3.5 Haiku")
            .with_context_window(200_000),
        ModelDescriptor::chat("claude-3-opus-latest", tag)
            .with_display_name("Claude 3 Opus")
            .with_context_window(200_000),
    ]
}

pub struct AnthropicProvider {
    core: ProviderCore,
    api: AnthropicApi,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let builtin = builtin_models(&config.tag);
        let core = ProviderCore::new(config, builtin);
        let api = AnthropicApi {
            http: build_client()?,
            base_url: core.config().endpoint_or(DEFAULT_BASE_URL),
            api_key: core.api_key().map(str::to_string),
        };
        Ok(Self { core, api })
    }

    pub fn core(&self) -> &ProviderCore {
        &self.core
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        self.core.name()
    }

    #[instrument(name = "anthropic.complete", skip(self, request), fields(provider = %self.name()))]
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        self.core.require_api_key()?;
        let model = self
            .core
            .completion_model(request.model.as_deref(), DEFAULT_MODEL);
        let system = request.system_prompt();
        let body = MessagesRequest {
            model: &model,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: system.as_deref(),
            messages: request
                .messages
                .iter()
                .filter(|m| m.role != Role::System)
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature: request.temperature,
            stop_sequences: request.stop.as_deref(),
        };

        let response = self
            .core
            .execute("complete", || self.api.messages(&body))
            .await?;

        let content: String = response
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();
        if content.is_empty() && response.content.is_empty() {
            return Err(HuginnError::EmptyResponse);
        }

        Ok(CompletionResponse {
            content,
            provider: self.name().to_string(),
            model: Some(response.model.unwrap_or(model)),
            usage: response.usage.map(|u| Usage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.input_tokens + u.output_tokens,
            }),
            finish_reason: FinishReason::from_provider(response.stop_reason.as_deref()),
        })
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>> {
        Ok(self.core.list_models(&self.api).await)
    }

    /// Credential presence only; Anthropic has no free health endpoint.
    async fn is_available(&self) -> bool {
        !self.core.rate_limiter().is_rate_limited() && self.core.api_key().is_some()
    }
}

struct AnthropicApi {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl AnthropicApi {
    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header("anthropic-version", API_VERSION);
        match &self.api_key {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }

    async fn messages(&self, body: &MessagesRequest<'_>) -> Result<MessagesResponse> {
        let response = self
            .request(self.http.post(format!("{}/v1/messages", self.base_url)))
            .json(body)
            .send()
            .await?;
        Ok(check_response(response, body.model).await?.json().await?)
    }
}

#[async_trait]
impl ModelFetcher for AnthropicApi {
    async fn fetch_models(&self) -> Result<Vec<ModelDescriptor>> {
        let response = self
            .request(self.http.get(format!("{}/v1/models", self.base_url)))
            .send()
            .await?;
        let list: ModelList = check_response(response, "models").await?.json().await?;
        Ok(list
            .data
            .into_iter()
            .map(|m| {
                let descriptor = ModelDescriptor::chat(m.id, "");
                match m.display_name {
                    Some(name) => descriptor.with_display_name(name),
                    None => descriptor,
                }
            })
            .collect())
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<&'a [String]>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
}
