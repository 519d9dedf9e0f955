//! HuggingFace Inference API provider.
//!
//! This client uses HuggingFace's serverless inference endpoints.
//! See: <https://huggingface.co/docs/api-inference/index>
//!
//! - embeddings via the feature-extraction pipeline
//! - completions via text-generation models
//!
//! The hub hosts far too many models to list, so discovery is static only.

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
    ModelDescriptor,
};
use crate::{HuginnError, Result};

/// Default base URL for HuggingFace Inference API
pub const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";

const DEFAULT_CHAT_MODEL: &str = "mistralai/Mistral-7B-Instruct-v0.3";
const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

fn builtin_models(tag: &str) -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor::chat(DEFAULT_CHAT_MODEL, tag),
        ModelDescriptor::embedding(DEFAULT_EMBEDDING_MODEL, tag),
        ModelDescriptor::embedding("sentence-transformers/all-mpnet-base-v2", tag),
        ModelDescriptor::embedding("BAAI/bge-small-en-v1.5", tag),
    ]
}

/// Provider for HuggingFace Inference API.
///
/// HuggingFace accepts any model string and forwards it to the API, so
/// requests for models outside the static list are still attempted.
pub struct HuggingFaceProvider {
    core: ProviderCore,
    api: HuggingFaceApi,
}

impl HuggingFaceProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let builtin = builtin_models(&config.tag);
        let core = ProviderCore::static_only(config, builtin);
        let api = HuggingFaceApi {
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
impl Provider for HuggingFaceProvider {
    fn name(&self) -> &str {
        self.core.name()
    }

    #[instrument(name = "huggingface.complete", skip(self, request), fields(provider = %self.name()))]
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        self.core.require_api_key()?;
        let model = self
            .core
            .completion_model(request.model.as_deref(), DEFAULT_CHAT_MODEL);
        let prompt = request.flattened_prompt();
        let body = GenerateRequest {
            inputs: &prompt,
            parameters: GenerateParameters {
                max_new_tokens: request.max_tokens,
                temperature: request.temperature,
                stop: request.stop.as_deref(),
                return_full_text: false,
            },
        };

        let generated = self
            .core
            .execute("complete", || self.api.generate(&model, &body))
            .await?;
        let first = generated
            .into_iter()
            .next()
            .ok_or(HuginnError::EmptyResponse)?;

        Ok(CompletionResponse {
            content: first.generated_text,
            provider: self.name().to_string(),
            model: Some(model),
            usage: None,
            finish_reason: FinishReason::Stop,
        })
    }

    #[instrument(name = "huggingface.embed", skip(self, request), fields(provider = %self.name(), batch = request.input.len()))]
    async fn embed(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse> {
        self.core.require_api_key()?;
        let model = self
            .core
            .embedding_model(request.model.as_deref(), DEFAULT_EMBEDDING_MODEL);
        let body = EmbedRequest {
            inputs: &request.input,
        };

        let output = self
            .core
            .execute("embed", || self.api.feature_extraction(&model, &body))
            .await?;

        Ok(EmbeddingResponse {
            embeddings: output.into_pooled(),
            provider: self.name().to_string(),
            model,
            usage: None,
        })
    }

    fn supports_embeddings(&self) -> bool {
        true
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>> {
        Ok(self.core.list_models(&NoDiscovery).await)
    }

    /// Credential presence only.
    async fn is_available(&self) -> bool {
        !self.core.rate_limiter().is_rate_limited() && self.core.api_key().is_some()
    }
}

struct HuggingFaceApi {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HuggingFaceApi {
    fn post(&self, url: String) -> reqwest::RequestBuilder {
        let builder = self.http.post(url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn generate(
        &self,
        model: &str,
        body: &GenerateRequest<'_>,
    ) -> Result<Vec<GeneratedText>> {
        let url = format!("{}/models/{}", self.base_url, model);
        let response = self.post(url).json(body).send().await?;
        Ok(check_response(response, model).await?.json().await?)
    }

    async fn feature_extraction(
        &self,
        model: &str,
        body: &EmbedRequest<'_>,
    ) -> Result<FeatureExtraction> {
        let url = format!("{}/pipeline/feature-extraction/{}", self.base_url, model);
        let response = self.post(url).json(body).send().await?;
        Ok(check_response(response, model).await?.json().await?)
    }
}

/// Static discovery never calls the fetcher.
struct NoDiscovery;

#[async_trait]
impl ModelFetcher for NoDiscovery {
    async fn fetch_models(&self) -> Result<Vec<ModelDescriptor>> {
        Ok(Vec::new())
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
}

/// Feature-extraction output.
///
/// Sentence-transformer models return one pooled vector per input
/// (`[[f32; dim]]`); raw encoders add a token axis (`[[[f32; dim]]]`), in
/// which case the first token (CLS) vector is used.
#[derive(Deserialize)]
#[serde(untagged)]
enum FeatureExtraction {
    Pooled(Vec<Vec<f32>>),
    Tokens(Vec<Vec<Vec<f32>>>),
}

impl FeatureExtraction {
    fn into_pooled(self) -> Vec<Vec<f32>> {
        match self {
            FeatureExtraction::Pooled(v) => v,
            FeatureExtraction::Tokens(v) => v
                .into_iter()
                .map(|tokens| tokens.into_iter().next().unwrap_or_default())
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    inputs: &'a str,
    parameters: GenerateParameters<'a>,
}

#[derive(Serialize)]
struct GenerateParameters<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_new_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
    return_full_text: bool,
}

#[derive(Deserialize)]
struct GeneratedText {
    generated_text: String,
}
