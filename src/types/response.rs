//! Response types

use serde::{Deserialize, Serialize};

/// Completion response, tagged with the provider that produced it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    /// Provider tag that served the request.
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub finish_reason: FinishReason,
}

/// Embedding response: one vector per input, in input order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub embeddings: Vec<Vec<f32>>,
    /// Provider tag that served the request.
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// A single embedding produced by the embedding pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    pub model: String,
    pub dimensions: usize,
    /// Whether the vector was served from the embedding cache.
    #[serde(default)]
    pub cached: bool,
}

impl Embedding {
    pub fn new(values: Vec<f32>, model: impl Into<String>) -> Self {
        Self {
            dimensions: values.len(),
            values,
            model: model.into(),
            cached: false,
        }
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason the model stopped generating
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    #[default]
    Stop,
    Length,
    ContentFilter,
    Other,
}

impl FinishReason {
    /// Map a provider's stop-reason string onto the common set.
    pub fn from_provider(reason: Option<&str>) -> Self {
        match reason {
            None | Some("stop") | Some("end_turn") | Some("stop_sequence") | Some("eos_token") => {
                FinishReason::Stop
            }
            Some("length") | Some("max_tokens") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            Some(_) => FinishReason::Other,
        }
    }
}
