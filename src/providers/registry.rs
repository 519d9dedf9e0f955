//! Provider factory registry.
//!
//! Maps a provider kind (`"openai"`, `"ollama"`, ...) to a factory that
//! builds an `Arc<dyn Provider>` from a [`ProviderConfig`]. The gateway
//! never names concrete provider types; new backends plug in through
//! [`ProviderRegistry::register_provider_class()`].
//!
//! ```text
//! [providers.openai]        ──► kind "openai"     ──► OpenAiProvider
//! [providers.local-llm]     ──► kind "openai"     ──► OpenAiProvider (tag "local-llm")
//!   kind = "openai"
//! [providers.ollama]        ──► kind "ollama"     ──► OllamaProvider
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::traits::Provider;
use crate::config::ProviderConfig;
use crate::{HuginnError, Result};

/// Builds a provider instance from its configuration.
pub type ProviderFactory = Arc<dyn Fn(ProviderConfig) -> Result<Arc<dyn Provider>> + Send + Sync>;

/// Registry of provider factories keyed by kind.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, ProviderFactory>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every provider kind compiled into this build.
    pub fn with_builtin_providers() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "openai")]
        {
            use super::openai::OpenAiProvider;
            registry.register_provider_class("openai", |config| {
                Ok(Arc::new(OpenAiProvider::new(config)?) as Arc<dyn Provider>)
            });
            registry.register_provider_class("openrouter", |config| {
                Ok(Arc::new(OpenAiProvider::openrouter(config)?) as Arc<dyn Provider>)
            });
        }

        #[cfg(feature = "anthropic")]
        registry.register_provider_class("anthropic", |config| {
            Ok(Arc::new(super::anthropic::AnthropicProvider::new(config)?) as Arc<dyn Provider>)
        });

        #[cfg(feature = "ollama")]
        registry.register_provider_class("ollama", |config| {
            Ok(Arc::new(super::ollama::OllamaProvider::new(config)?) as Arc<dyn Provider>)
        });

        #[cfg(feature = "huggingface")]
        registry.register_provider_class("huggingface", |config| {
            Ok(Arc::new(super::huggingface::HuggingFaceProvider::new(config)?) as Arc<dyn Provider>)
        });

        registry
    }

    /// Register (or replace) the factory for `kind`.
    pub fn register_provider_class<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(ProviderConfig) -> Result<Arc<dyn Provider>> + Send + Sync + 'static,
    {
        let kind = kind.into();
        debug!(kind = %kind, "registered provider class");
        self.factories.insert(kind, Arc::new(factory));
    }

    /// Whether a factory exists for `kind`.
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Build one provider.
    ///
    /// The instance is tagged `tag`; the factory is chosen by
    /// `config.kind`, falling back to `tag`.
    pub fn create_provider(
        &self,
        tag: &str,
        mut config: ProviderConfig,
    ) -> Result<Arc<dyn Provider>> {
        config.tag = tag.to_string();
        let kind = config.kind_or_tag().to_string();
        let factory = self.factories.get(&kind).ok_or_else(|| {
            HuginnError::Configuration(format!("unknown provider kind '{kind}' for '{tag}'"))
        })?;
        factory(config)
    }

    /// Build every configured provider.
    ///
    /// Providers that fail to build are logged and left out; the rest are
    /// returned keyed by tag.
    pub fn initialize_default_providers(
        &self,
        configs: &BTreeMap<String, ProviderConfig>,
    ) -> BTreeMap<String, Arc<dyn Provider>> {
        let mut providers = BTreeMap::new();
        for (tag, config) in configs {
            match self.create_provider(tag, config.clone()) {
                Ok(provider) => {
                    debug!(provider = %tag, "provider initialized");
                    providers.insert(tag.clone(), provider);
                }
                Err(e) => warn!(provider = %tag, error = %e, "failed to initialize provider, skipping"),
            }
        }
        providers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CompletionRequest, CompletionResponse, ModelDescriptor};
    use async_trait::async_trait;

    struct Named(String);

    #[async_trait]
    impl Provider for Named {
        fn name(&self) -> &str {
            &self.0
        }
        async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse> {
            Err(HuginnError::Unsupported)
        }
        async fn list_models(&self) -> Result<Vec<ModelDescriptor>> {
            Ok(vec![])
        }
        async fn is_available(&self) -> bool {
            true
        }
    }

    fn registry() -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        registry.register_provider_class("stub", |config| {
            Ok(Arc::new(Named(config.tag)) as Arc<dyn Provider>)
        });
        registry.register_provider_class("broken", |_| {
            Err(HuginnError::Configuration("broken on purpose".into()))
        });
        registry
    }

    #[test]
    fn creates_by_tag_or_kind() {
        let registry = registry();
        let direct = registry
            .create_provider("stub", ProviderConfig::default())
            .unwrap();
        assert_eq!(direct.name(), "stub");

        let aliased = registry
            .create_provider("mine", ProviderConfig::default().kind("stub"))
            .unwrap();
        assert_eq!(aliased.name(), "mine");
    }

    #[test]
    fn unknown_kind_is_configuration_error() {
        let err = registry()
            .create_provider("nope", ProviderConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, HuginnError::Configuration(_)));
    }

    #[test]
    fn initialization_skips_failures() {
        let mut configs = BTreeMap::new();
        configs.insert("stub".to_string(), ProviderConfig::new("stub"));
        configs.insert("broken".to_string(), ProviderConfig::new("broken"));
        configs.insert("missing".to_string(), ProviderConfig::new("missing"));

        let providers = registry().initialize_default_providers(&configs);
        assert_eq!(providers.keys().collect::<Vec<_>>(), vec!["stub"]);
    }

    #[test]
    fn builtin_kinds_follow_features() {
        let registry = ProviderRegistry::with_builtin_providers();
        assert_eq!(registry.contains("openai"), cfg!(feature = "openai"));
        assert_eq!(registry.contains("openrouter"), cfg!(feature = "openai"));
        assert_eq!(registry.contains("anthropic"), cfg!(feature = "anthropic"));
        assert_eq!(registry.contains("ollama"), cfg!(feature = "ollama"));
        assert_eq!(registry.contains("huggingface"), cfg!(feature = "huggingface"));
    }
}
