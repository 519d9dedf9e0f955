//! Huginn - resilient multi-provider LLM gateway
//!
//! This crate routes completion and embedding requests across several LLM
//! providers (OpenAI, OpenRouter, Anthropic, Ollama, HuggingFace), retrying
//! transient failures, honouring rate limits, and falling back through an
//! ordered list of providers until one succeeds. Embeddings can be served
//! through a disk-backed cache with pluggable eviction.
//!
//! # Completion Example
//!
//! ```rust,no_run
//! use huginn::{CompletionRequest, GatewayClient, Message};
//!
//! #[tokio::main]
//! async fn main() -> huginn::Result<()> {
//!     let gateway = GatewayClient::builder()
//!         .openai("sk-your-key")
//!         .ollama("http://localhost:11434")
//!         .preferred("openai")
//!         .fallback_order(["ollama"])
//!         .build()?;
//!
//!     let request = CompletionRequest::from_messages(vec![
//!         Message::system("You are a helpful assistant."),
//!         Message::user("What is the capital of France?"),
//!     ]);
//!     let response = gateway.complete(&request, None).await?;
//!
//!     println!("{} (via {})", response.content, response.provider);
//!     Ok(())
//! }
//! ```
//!
//! # Embeddings Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use huginn::{
//!     DimensionManager, EmbeddingCache, EmbeddingCacheConfig, EmbeddingPipeline, GatewayClient,
//! };
//!
//! #[tokio::main]
//! async fn main() -> huginn::Result<()> {
//!     let gateway = Arc::new(GatewayClient::builder().ollama("http://localhost:11434").build()?);
//!     let cache = EmbeddingCache::open(EmbeddingCacheConfig::new("/tmp/huginn-embeddings"))?;
//!     let pipeline = EmbeddingPipeline::new(gateway, DimensionManager::with_defaults(), Some(cache));
//!
//!     let embedding = pipeline.embed("Hello, world!", "nomic-embed-text").await?;
//!     println!("dimensions: {}", embedding.dimensions);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod gateway;
pub mod providers;
pub mod telemetry;
pub mod types;

// Re-export main types at crate root
pub use config::{GatewayConfig, ProviderConfig};
pub use error::{HuginnError, ProviderFailure, Result};
pub use gateway::{GatewayBuilder, GatewayClient};
pub use providers::{Provider, ProviderRegistry, RetryConfig};

pub use embeddings::{
    CacheEntry, CacheStats, DimensionCheck, DimensionManager, EmbeddingCache,
    EmbeddingCacheConfig, EmbeddingPipeline, EvictionStrategy, ModelInfo, PipelineConfig,
    StorageEstimate,
};

// Re-export all types
pub use types::{
    CompletionRequest, CompletionResponse, Embedding, EmbeddingRequest, EmbeddingResponse,
    FinishReason, Message, ModelCapability, ModelDescriptor, Role, Usage,
};

/// Crate version, as published.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
