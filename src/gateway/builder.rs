//! Builder for configuring gateway instances

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::GatewayClient;
use crate::config::ProviderConfig;
use crate::providers::{DiscoveryConfig, Provider, ProviderRegistry, RetryConfig};
use crate::{HuginnError, Result};

/// Builder for [`GatewayClient`].
///
/// ```rust,no_run
/// use huginn::{CompletionRequest, GatewayClient};
///
/// #[tokio::main]
/// async fn main() -> huginn::Result<()> {
///     let gateway = GatewayClient::builder()
///         .openai("sk-your-key")
///         .ollama("http://localhost:11434")
///         .preferred("ollama")
///         .fallback_order(["openai"])
///         .build()?;
///
///     let response = gateway
///         .complete(&CompletionRequest::new("What is the capital of France?"), None)
///         .await?;
///     println!("{} (via {})", response.content, response.provider);
///     Ok(())
/// }
/// ```
pub struct GatewayBuilder {
    registry: ProviderRegistry,
    configs: BTreeMap<String, ProviderConfig>,
    instances: BTreeMap<String, Arc<dyn Provider>>,
    preferred: Option<String>,
    fallback_order: Vec<String>,
    retry: Option<RetryConfig>,
    timeout: Option<Duration>,
    discovery: Option<DiscoveryConfig>,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self {
            registry: ProviderRegistry::with_builtin_providers(),
            configs: BTreeMap::new(),
            instances: BTreeMap::new(),
            preferred: None,
            fallback_order: Vec::new(),
            retry: None,
            timeout: None,
            discovery: None,
        }
    }

    /// Replace the factory registry used to build configured providers.
    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Add a provider built from configuration via the registry.
    pub fn provider_config(mut self, config: ProviderConfig) -> Self {
        self.configs.insert(config.tag.clone(), config);
        self
    }

    /// Add an already constructed provider under its own name.
    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.instances.insert(provider.name().to_string(), provider);
        self
    }

    /// Configure the OpenAI provider.
    pub fn openai(self, api_key: impl Into<String>) -> Self {
        self.provider_config(ProviderConfig::new("openai").api_key(api_key))
    }

    /// Configure OpenRouter (OpenAI-compatible, routes to many models).
    pub fn openrouter(self, api_key: impl Into<String>) -> Self {
        self.provider_config(ProviderConfig::new("openrouter").api_key(api_key))
    }

    /// Configure the Anthropic provider.
    pub fn anthropic(self, api_key: impl Into<String>) -> Self {
        self.provider_config(ProviderConfig::new("anthropic").api_key(api_key))
    }

    /// Configure Ollama provider with custom URL.
    pub fn ollama(self, url: impl Into<String>) -> Self {
        self.provider_config(ProviderConfig::new("ollama").endpoint(url))
    }

    /// Configure the HuggingFace Inference API provider.
    pub fn huggingface(self, api_key: impl Into<String>) -> Self {
        self.provider_config(ProviderConfig::new("huggingface").api_key(api_key))
    }

    /// Provider tried first when no explicit provider is requested.
    pub fn preferred(mut self, tag: impl Into<String>) -> Self {
        self.preferred = Some(tag.into());
        self
    }

    /// Providers tried, in order, after the preferred one.
    pub fn fallback_order<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_order = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Retry policy for configured providers without their own override.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    /// Per-call timeout for configured providers that keep the default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Discovery settings for configured providers that keep the default.
    pub fn discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Build the gateway.
    ///
    /// Providers that fail to build are logged and skipped. Fails with
    /// [`HuginnError::NoProvider`] when nothing is left.
    pub fn build(self) -> Result<GatewayClient> {
        let configs: BTreeMap<String, ProviderConfig> = self
            .configs
            .into_iter()
            .map(|(tag, mut config)| {
                if config.retry.is_none() {
                    config.retry = self.retry.clone();
                }
                if let Some(timeout) = self.timeout {
                    if config.timeout == crate::config::DEFAULT_TIMEOUT {
                        config.timeout = timeout;
                    }
                }
                if let Some(discovery) = &self.discovery {
                    config.discovery = discovery.clone();
                }
                (tag, config)
            })
            .collect();

        let mut providers = self.registry.initialize_default_providers(&configs);
        providers.extend(self.instances);

        if providers.is_empty() {
            return Err(HuginnError::NoProvider);
        }

        for tag in self.preferred.iter().chain(self.fallback_order.iter()) {
            if !providers.contains_key(tag) {
                warn!(provider = %tag, "provider in fallback order is not configured");
            }
        }

        Ok(GatewayClient::new(
            providers,
            self.preferred,
            self.fallback_order,
        ))
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}
