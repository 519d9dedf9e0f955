//! Provider layer.
//!
//! Each backend implements [`Provider`] on top of a shared
//! [`ProviderCore`], which composes the per-provider [`RateLimiter`],
//! [`RetryHandler`], and [`ModelDiscovery`]. Concrete backends are gated
//! behind cargo features and constructed through [`ProviderRegistry`].

pub mod core;
pub mod discovery;
mod http;
pub mod rate_limit;
pub mod registry;
pub mod retry;
pub mod traits;

#[cfg(feature = "anthropic")]
pub mod anthropic;
#[cfg(feature = "huggingface")]
pub mod huggingface;
#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;

pub use self::core::ProviderCore;
pub use discovery::{DiscoveryConfig, ModelDiscovery, ModelFetcher};
pub use rate_limit::RateLimiter;
pub use registry::{ProviderFactory, ProviderRegistry};
pub use retry::{DEFAULT_RATE_LIMIT_WAIT, RetryConfig, RetryHandler};
pub use traits::Provider;

#[cfg(feature = "anthropic")]
pub use anthropic::AnthropicProvider;
#[cfg(feature = "huggingface")]
pub use huggingface::HuggingFaceProvider;
#[cfg(feature = "ollama")]
pub use ollama::OllamaProvider;
#[cfg(feature = "openai")]
pub use openai::OpenAiProvider;
