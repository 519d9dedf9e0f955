//! The provider capability interface.
//!
//! Every backend implements [`Provider`]. The gateway holds providers as
//! `Arc<dyn Provider>` keyed by tag and never branches on the concrete
//! type; construction is the only place concrete types appear (see
//! [`ProviderRegistry`](super::ProviderRegistry)).
//!
//! # Failure semantics
//!
//! - `is_available()` returning `false` makes the gateway skip the provider
//!   without calling it
//! - any error from `complete()` / `embed()` makes the gateway move on to the
//!   next candidate; providers retry internally before giving up
//! - `list_models()` failures are reported as an empty list by the gateway

use async_trait::async_trait;

use crate::types::{
    CompletionRequest, CompletionResponse, EmbeddingRequest, EmbeddingResponse, ModelDescriptor,
};
use crate::{HuginnError, Result};

/// A backend implementing the completion/embedding capability interface.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider tag for routing, logging, and response attribution.
    fn name(&self) -> &str;

    /// Text completion.
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse>;

    /// Embeddings for every input text, in input order.
    async fn embed(&self, _request: &EmbeddingRequest) -> Result<EmbeddingResponse> {
        Err(HuginnError::Unsupported)
    }

    /// Whether [`embed()`](Self::embed) is implemented at all.
    fn supports_embeddings(&self) -> bool {
        false
    }

    /// Models this provider offers (static, cached, or discovered).
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>>;

    /// Cheap liveness check. Rate-limited providers report `false`.
    async fn is_available(&self) -> bool;

    /// Release held network resources. Default: nothing to release.
    async fn cleanup(&self) {}
}
