//! Model descriptor types.
//!
//! Types for describing the models a provider exposes, either from its
//! static fallback list or from dynamic discovery.

use serde::{Deserialize, Serialize};

/// A capability that a model may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelCapability {
    /// Single-turn text completion.
    Completion,
    /// Multi-turn chat conversations.
    Chat,
    /// Text embeddings.
    Embedding,
}

/// Information about a model offered by a provider.
///
/// Identity is `id` within a provider. Descriptors are immutable once
/// discovered; the builder methods are for construction only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Model identifier (e.g., "gpt-4o-mini", "nomic-embed-text").
    pub id: String,
    /// Human-readable name. Defaults to the id.
    #[serde(rename = "name", default)]
    pub display_name: String,
    /// Provider tag (e.g., "openai", "ollama").
    pub provider: String,
    /// Capabilities this model supports (no duplicates).
    #[serde(default)]
    pub capabilities: Vec<ModelCapability>,
    /// Maximum context window in tokens (if known).
    #[serde(default)]
    pub context_window: Option<usize>,
    /// Maximum output tokens (if known).
    #[serde(default)]
    pub max_output_tokens: Option<usize>,
}

impl ModelDescriptor {
    /// Create a new descriptor with required fields.
    pub fn new(id: impl Into<String>, provider: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            provider: provider.into(),
            capabilities: Vec::new(),
            context_window: None,
            max_output_tokens: None,
        }
    }

    /// Set the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Add a capability to this model.
    pub fn with_capability(mut self, cap: ModelCapability) -> Self {
        if !self.capabilities.contains(&cap) {
            self.capabilities.push(cap);
        }
        self
    }

    /// Set the context window size.
    pub fn with_context_window(mut self, tokens: usize) -> Self {
        self.context_window = Some(tokens);
        self
    }

    /// Set the maximum output tokens.
    pub fn with_max_output_tokens(mut self, tokens: usize) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// Whether this model supports the given capability.
    pub fn supports(&self, cap: ModelCapability) -> bool {
        self.capabilities.contains(&cap)
    }

    /// Shorthand for a chat + completion model.
    pub fn chat(id: impl Into<String>, provider: impl Into<String>) -> Self {
        Self::new(id, provider)
            .with_capability(ModelCapability::Completion)
            .with_capability(ModelCapability::Chat)
    }

    /// Shorthand for an embedding model.
    pub fn embedding(id: impl Into<String>, provider: impl Into<String>) -> Self {
        Self::new(id, provider).with_capability(ModelCapability::Embedding)
    }
}
