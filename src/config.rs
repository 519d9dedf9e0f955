//! Gateway configuration.
//!
//! Configuration is an explicit value passed to
//! [`GatewayClient::from_config()`](crate::GatewayClient::from_config);
//! nothing is read from global state. It can be built in code or parsed
//! from TOML:
//!
//! ```toml
//! preferred_provider = "openai"
//! fallback_order = ["anthropic", "ollama"]
//!
//! [retry]
//! max_retries = 3
//! base_delay_ms = 1000
//!
//! [providers.openai]
//! api_key_env = "OPENAI_API_KEY"
//! timeout_secs = 60
//!
//! [providers.ollama]
//! endpoint = "http://localhost:11434"
//!
//! [providers.ollama.discovery]
//! force_static = false
//! cache_ttl_secs = 3600
//!
//! [embedding_cache]
//! dir = "/var/cache/huginn/embeddings"
//! max_size = 10000
//! strategy = "lru"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::embeddings::EmbeddingCacheConfig;
use crate::providers::{DiscoveryConfig, RetryConfig};
use crate::types::ModelDescriptor;
use crate::{HuginnError, Result};

/// Default per-call timeout for provider requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default lifetime of a cached health-probe result.
pub const DEFAULT_AVAILABILITY_TTL: Duration = Duration::from_secs(60);

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Provider tried first when no explicit provider is requested.
    pub preferred_provider: Option<String>,
    /// Providers tried, in order, after the preferred one.
    pub fallback_order: Vec<String>,
    /// Retry policy applied to providers without their own override.
    pub retry: RetryConfig,
    /// Provider settings keyed by tag.
    pub providers: BTreeMap<String, ProviderConfig>,
    /// Disk-backed embedding cache; `None` disables caching.
    pub embedding_cache: Option<EmbeddingCacheConfig>,
}

impl GatewayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: GatewayConfig = toml::from_str(content)
            .map_err(|e| HuginnError::Configuration(format!("failed to parse config: {e}")))?;
        for (tag, provider) in config.providers.iter_mut() {
            provider.tag = tag.clone();
        }
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HuginnError::Configuration(format!("failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml_str(&content)
    }

    /// Add (or replace) a provider configuration.
    pub fn provider(mut self, config: ProviderConfig) -> Self {
        self.providers.insert(config.tag.clone(), config);
        self
    }

    pub fn preferred_provider(mut self, tag: impl Into<String>) -> Self {
        self.preferred_provider = Some(tag.into());
        self
    }

    pub fn fallback_order<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_order = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn embedding_cache(mut self, cache: EmbeddingCacheConfig) -> Self {
        self.embedding_cache = Some(cache);
        self
    }
}

/// Settings for one provider instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Instance tag; filled from the `[providers.<tag>]` table key.
    #[serde(skip)]
    pub tag: String,
    /// Registered provider kind to instantiate. Defaults to the tag, so
    /// `[providers.openai]` builds the `openai` kind.
    pub kind: Option<String>,
    /// Base URL override.
    pub endpoint: Option<String>,
    /// Credential, given inline.
    pub api_key: Option<String>,
    /// Environment variable holding the credential.
    pub api_key_env: Option<String>,
    /// Per-call timeout.
    #[serde(rename = "timeout_secs", deserialize_with = "secs")]
    pub timeout: Duration,
    /// How long a health-probe result stays valid.
    #[serde(rename = "availability_ttl_secs", deserialize_with = "secs")]
    pub availability_ttl: Duration,
    /// Model used for completions when the request names none.
    pub default_model: Option<String>,
    /// Model used for embeddings when the request names none.
    pub default_embedding_model: Option<String>,
    /// Replaces the provider's built-in static model list.
    pub static_models: Option<Vec<ModelDescriptor>>,
    pub discovery: DiscoveryConfig,
    /// Per-provider retry override.
    pub retry: Option<RetryConfig>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            tag: String::new(),
            kind: None,
            endpoint: None,
            api_key: None,
            api_key_env: None,
            timeout: DEFAULT_TIMEOUT,
            availability_ttl: DEFAULT_AVAILABILITY_TTL,
            default_model: None,
            default_embedding_model: None,
            static_models: None,
            discovery: DiscoveryConfig::default(),
            retry: None,
        }
    }
}

impl ProviderConfig {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn availability_ttl(mut self, ttl: Duration) -> Self {
        self.availability_ttl = ttl;
        self
    }

    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn default_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.default_embedding_model = Some(model.into());
        self
    }

    pub fn static_models(mut self, models: Vec<ModelDescriptor>) -> Self {
        self.static_models = Some(models);
        self
    }

    pub fn discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Registered kind this config instantiates.
    pub fn kind_or_tag(&self) -> &str {
        self.kind.as_deref().unwrap_or(&self.tag)
    }

    /// The credential: inline key first, then the named environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| {
                self.api_key_env
                    .as_deref()
                    .and_then(|var| std::env::var(var).ok())
                    .filter(|k| !k.is_empty())
            })
    }

    /// Endpoint override or the provider's default.
    pub fn endpoint_or(&self, default: &str) -> String {
        self.endpoint
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }
}

fn secs<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Duration, D::Error> {
    u64::deserialize(d).map(Duration::from_secs)
}
