//! Shared per-provider machinery.
//!
//! Every built-in provider embeds a [`ProviderCore`] and routes its network
//! calls through it. The core owns the provider's configuration, its
//! [`RateLimiter`], its [`RetryHandler`], and its [`ModelDiscovery`], and
//! exposes the two composite operations providers need:
//!
//! - [`execute()`](ProviderCore::execute): one network call under the
//!   retry/timeout/rate-limit policy
//! - [`check_availability()`](ProviderCore::check_availability): a cached
//!   health probe that short-circuits while rate limited

use std::future::Future;

use tracing::debug;

use super::discovery::{ModelDiscovery, ModelFetcher};
use super::rate_limit::RateLimiter;
use super::retry::{RetryHandler, with_retry};
use crate::config::ProviderConfig;
use crate::types::ModelDescriptor;
use crate::{HuginnError, Result};

/// Configuration, rate limiting, retry, and discovery for one provider.
pub struct ProviderCore {
    config: ProviderConfig,
    api_key: Option<String>,
    limiter: RateLimiter,
    retry: RetryHandler,
    discovery: ModelDiscovery,
}

impl ProviderCore {
    /// Core with cache-backed dynamic discovery.
    ///
    /// `builtin_models` is the static fallback list unless the config
    /// overrides it.
    pub fn new(config: ProviderConfig, builtin_models: Vec<ModelDescriptor>) -> Self {
        let static_models = Self::static_models_for(&config, builtin_models);
        let discovery = ModelDiscovery::new(config.tag.clone(), static_models, &config.discovery)
            .fetch_timeout(config.timeout);
        Self::assemble(config, discovery)
    }

    /// Core whose model list is always the static one.
    pub fn static_only(config: ProviderConfig, builtin_models: Vec<ModelDescriptor>) -> Self {
        let static_models = Self::static_models_for(&config, builtin_models);
        let discovery = ModelDiscovery::static_only(config.tag.clone(), static_models);
        Self::assemble(config, discovery)
    }

    fn assemble(config: ProviderConfig, discovery: ModelDiscovery) -> Self {
        let retry = RetryHandler::new(config.tag.clone(), config.retry.clone().unwrap_or_default());
        Self {
            api_key: config.resolve_api_key(),
            limiter: RateLimiter::new(),
            retry,
            discovery,
            config,
        }
    }

    fn static_models_for(
        config: &ProviderConfig,
        builtin_models: Vec<ModelDescriptor>,
    ) -> Vec<ModelDescriptor> {
        config
            .static_models
            .clone()
            .unwrap_or(builtin_models)
            .into_iter()
            .map(|mut m| {
                m.provider = config.tag.clone();
                m
            })
            .collect()
    }

    pub fn name(&self) -> &str {
        &self.config.tag
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn retry_handler(&self) -> &RetryHandler {
        &self.retry
    }

    pub fn discovery(&self) -> &ModelDiscovery {
        &self.discovery
    }

    /// The resolved credential, if configured.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// The resolved credential, or a configuration error naming the provider.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key().ok_or_else(|| {
            HuginnError::Configuration(format!("no API key configured for {}", self.name()))
        })
    }

    /// Model for a completion: the request's, else the configured default,
    /// else `builtin`.
    pub fn completion_model(&self, requested: Option<&str>, builtin: &str) -> String {
        requested
            .or(self.config.default_model.as_deref())
            .unwrap_or(builtin)
            .to_string()
    }

    /// Model for an embedding: the request's, else the configured default,
    /// else `builtin`.
    pub fn embedding_model(&self, requested: Option<&str>, builtin: &str) -> String {
        requested
            .or(self.config.default_embedding_model.as_deref())
            .unwrap_or(builtin)
            .to_string()
    }

    /// Run one network operation under the retry policy and per-call timeout.
    pub async fn execute<F, Fut, T>(&self, operation: &str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        with_retry(&self.retry, &self.limiter, operation, self.config.timeout, f).await
    }

    /// Availability with rate-limit short-circuit and probe caching.
    ///
    /// While rate limited this returns `false` without probing. A cached
    /// probe result younger than the configured TTL is reused; otherwise
    /// `probe` runs through [`execute()`](Self::execute) and its outcome is
    /// cached.
    pub async fn check_availability<F, Fut>(&self, probe: F) -> bool
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if self.limiter.is_rate_limited() {
            debug!(provider = %self.name(), "provider rate limited, reporting unavailable");
            return false;
        }

        if let Some(cached) = self
            .limiter
            .check_availability_cache(self.config.availability_ttl)
        {
            return cached;
        }

        let available = match self.execute("probe", probe).await {
            Ok(()) => true,
            Err(e) => {
                debug!(provider = %self.name(), error = %e, "availability probe failed");
                false
            }
        };
        self.limiter.update_availability_cache(available);
        available
    }

    /// Static, cached, or discovered models via `fetcher`.
    pub async fn list_models<M>(&self, fetcher: &M) -> Vec<ModelDescriptor>
    where
        M: ModelFetcher + ?Sized,
    {
        self.discovery.discover_models(fetcher).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{DiscoveryConfig, RetryConfig};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn core(config: ProviderConfig) -> ProviderCore {
        ProviderCore::static_only(
            config.retry(
                RetryConfig::new()
                    .max_retries(2)
                    .base_delay(Duration::from_millis(1)),
            ),
            vec![ModelDescriptor::chat("builtin", "wrong-tag")],
        )
    }

    #[test]
    fn static_models_are_retagged() {
        let core = core(ProviderConfig::new("local"));
        assert_eq!(core.discovery().static_models()[0].provider, "local");
    }

    #[test]
    fn config_static_models_override_builtin() {
        let core = core(
            ProviderConfig::new("local")
                .static_models(vec![ModelDescriptor::chat("custom", "local")]),
        );
        assert_eq!(core.discovery().static_models()[0].id, "custom");
    }

    #[test]
    fn missing_key_is_configuration_error() {
        let core = core(ProviderConfig::new("openai"));
        assert!(core.api_key().is_none());
        assert!(matches!(
            core.require_api_key(),
            Err(HuginnError::Configuration(_))
        ));
    }

    #[test]
    fn model_resolution_order() {
        let core = core(ProviderConfig::new("openai").default_model("configured"));
        assert_eq!(core.completion_model(Some("asked"), "builtin"), "asked");
        assert_eq!(core.completion_model(None, "builtin"), "configured");
        assert_eq!(core.embedding_model(None, "builtin"), "builtin");
    }

    #[tokio::test(start_paused = true)]
    async fn probe_result_is_cached_for_ttl() {
        let core = core(ProviderConfig::new("p").availability_ttl(Duration::from_secs(30)));
        let probes = AtomicU32::new(0);
        let probe = || {
            probes.fetch_add(1, Ordering::Relaxed);
            async { Ok(()) }
        };

        assert!(core.check_availability(probe).await);
        assert!(core.check_availability(probe).await);
        assert_eq!(probes.load(Ordering::Relaxed), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(core.check_availability(probe).await);
        assert_eq!(probes.load(Ordering::Relaxed), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_reports_unavailable() {
        let core = core(ProviderConfig::new("p"));
        let available = core
            .check_availability(|| async { Err(HuginnError::Http("refused".into())) })
            .await;
        assert!(!available);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_provider_skips_probe() {
        let core = core(ProviderConfig::new("p"));
        core.rate_limiter()
            .set_rate_limit(Duration::from_secs(60), "p");
        let probes = AtomicU32::new(0);

        let available = core
            .check_availability(|| {
                probes.fetch_add(1, Ordering::Relaxed);
                async { Ok(()) }
            })
            .await;

        assert!(!available);
        assert_eq!(probes.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn dynamic_core_uses_discovery_config() {
        let dir = tempfile::tempdir().unwrap();
        let core = ProviderCore::new(
            ProviderConfig::new("p").discovery(DiscoveryConfig::new().cache_dir(dir.path())),
            vec![],
        );
        assert!(core.discovery().cache().is_some());
    }
}
