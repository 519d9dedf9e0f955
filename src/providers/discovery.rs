//! Per-provider model discovery.
//!
//! [`ModelDiscovery`] decides where a provider's model list comes from:
//!
//! ```text
//! force_static? ──yes──► static list
//!      │no
//!      ▼
//! cache hit? ─────yes──► cached list
//!      │no
//!      ▼
//! dynamic fetch ──ok───► persist to cache, return fetched list
//!      │err
//!      ▼
//! static list (error logged, never surfaced)
//! ```
//!
//! The dynamic fetch is provider-specific and supplied through the
//! [`ModelFetcher`] trait.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{HuginnError, Result};
use crate::cache::{DEFAULT_DISCOVERY_TTL, ModelDiscoveryCache, default_discovery_dir};
use crate::types::ModelDescriptor;

/// Provider-specific dynamic model listing.
#[async_trait]
pub trait ModelFetcher: Send + Sync {
    /// Query the provider for its current models.
    ///
    /// Errors are caught by [`ModelDiscovery`] and replaced by the static list.
    async fn fetch_models(&self) -> Result<Vec<ModelDescriptor>>;
}

/// Discovery settings for one provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Read and write the on-disk discovery cache. Default: true.
    pub use_cache: bool,
    /// Never touch the cache or network; always use static models. Default: false.
    pub force_static: bool,
    /// Time-to-live for cached model lists. Default: 24 hours.
    #[serde(rename = "cache_ttl_secs", deserialize_with = "secs")]
    pub cache_ttl: Duration,
    /// Directory holding `<provider>_models.json`. Default: `~/.cache/huginn/models`.
    pub cache_dir: PathBuf,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            use_cache: true,
            force_static: false,
            cache_ttl: DEFAULT_DISCOVERY_TTL,
            cache_dir: default_discovery_dir(),
        }
    }
}

impl DiscoveryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn use_cache(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }

    pub fn force_static(mut self, enabled: bool) -> Self {
        self.force_static = enabled;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }
}

fn secs<'de, D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Duration, D::Error> {
    u64::deserialize(d).map(Duration::from_secs)
}

/// Static / cached / dynamic model listing for one provider.
#[derive(Debug, Clone)]
pub struct ModelDiscovery {
    provider: String,
    static_models: Vec<ModelDescriptor>,
    cache: Option<ModelDiscoveryCache>,
    force_static: bool,
    fetch_timeout: Option<Duration>,
}

impl ModelDiscovery {
    pub fn new(
        provider: impl Into<String>,
        static_models: Vec<ModelDescriptor>,
        config: &DiscoveryConfig,
    ) -> Self {
        let provider = provider.into();
        let cache = config.use_cache.then(|| {
            ModelDiscoveryCache::new(provider.clone(), &config.cache_dir, config.cache_ttl)
        });
        Self {
            provider,
            static_models,
            cache,
            force_static: config.force_static,
            fetch_timeout: None,
        }
    }

    /// Bound each dynamic fetch; an elapsed fetch counts as a failure.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Discovery that only ever returns the static list.
    pub fn static_only(provider: impl Into<String>, static_models: Vec<ModelDescriptor>) -> Self {
        Self {
            provider: provider.into(),
            static_models,
            cache: None,
            force_static: true,
            fetch_timeout: None,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// The hardcoded fallback list.
    pub fn static_models(&self) -> &[ModelDescriptor] {
        &self.static_models
    }

    /// The on-disk cache, when enabled.
    pub fn cache(&self) -> Option<&ModelDiscoveryCache> {
        self.cache.as_ref()
    }

    /// Resolve the provider's model list. Never fails.
    pub async fn discover_models<F>(&self, fetcher: &F) -> Vec<ModelDescriptor>
    where
        F: ModelFetcher + ?Sized,
    {
        if self.force_static {
            return self.static_models.clone();
        }

        if let Some(models) = self.cache.as_ref().and_then(|c| c.get()) {
            debug!(provider = %self.provider, count = models.len(), "using cached model list");
            return models;
        }

        self.fetch_or_static(fetcher).await
    }

    /// Like [`discover_models()`](Self::discover_models) but skips the cache read.
    pub async fn refresh<F>(&self, fetcher: &F) -> Vec<ModelDescriptor>
    where
        F: ModelFetcher + ?Sized,
    {
        if self.force_static {
            return self.static_models.clone();
        }
        self.fetch_or_static(fetcher).await
    }

    /// Drop the persisted model list, if any.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    async fn fetch_or_static<F>(&self, fetcher: &F) -> Vec<ModelDescriptor>
    where
        F: ModelFetcher + ?Sized,
    {
        let fetched = match self.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, fetcher.fetch_models())
                .await
                .unwrap_or(Err(HuginnError::Timeout(limit))),
            None => fetcher.fetch_models().await,
        };

        match fetched {
            Ok(models) if models.is_empty() => {
                debug!(provider = %self.provider, "dynamic discovery returned no models, using static list");
                self.static_models.clone()
            }
            Ok(models) => {
                let models: Vec<ModelDescriptor> = models
                    .into_iter()
                    .map(|mut m| {
                        m.provider = self.provider.clone();
                        m
                    })
                    .collect();
                if let Some(cache) = &self.cache {
                    cache.set(&models);
                }
                debug!(provider = %self.provider, count = models.len(), "discovered models");
                models
            }
            Err(e) => {
                warn!(provider = %self.provider, error = %e, "model discovery failed, using static list");
                self.static_models.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StubFetcher {
        result: fn() -> Result<Vec<ModelDescriptor>>,
        calls: AtomicU32,
    }

    impl StubFetcher {
        fn new(result: fn() -> Result<Vec<ModelDescriptor>>) -> Self {
            Self {
                result,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl ModelFetcher for StubFetcher {
        async fn fetch_models(&self) -> Result<Vec<ModelDescriptor>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            (self.result)()
        }
    }

    fn static_models() -> Vec<ModelDescriptor> {
        vec![ModelDescriptor::chat("static-model", "test")]
    }

    fn dynamic_models() -> Result<Vec<ModelDescriptor>> {
        // Provider tag deliberately wrong: discovery must re-tag.
        Ok(vec![
            ModelDescriptor::chat("dyn-a", "elsewhere"),
            ModelDescriptor::chat("dyn-b", "elsewhere"),
        ])
    }

    fn failing() -> Result<Vec<ModelDescriptor>> {
        Err(HuginnError::Http("connection refused".into()))
    }

    fn config(dir: &std::path::Path) -> DiscoveryConfig {
        DiscoveryConfig::new().cache_dir(dir)
    }

    #[tokio::test]
    async fn force_static_ignores_cache_and_network() {
        let dir = tempfile::tempdir().unwrap();
        let populated = ModelDiscovery::new("test", static_models(), &config(dir.path()));
        populated
            .discover_models(&StubFetcher::new(dynamic_models))
            .await;
        assert!(populated.cache().unwrap().get().is_some());

        let forced = ModelDiscovery::new(
            "test",
            static_models(),
            &config(dir.path()).force_static(true),
        );
        let fetcher = StubFetcher::new(dynamic_models);
        let models = forced.discover_models(&fetcher).await;

        assert_eq!(models, static_models());
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn fetch_success_is_retagged_and_cached() {
        let dir = tempfile::tempdir().unwrap();
        let discovery = ModelDiscovery::new("test", static_models(), &config(dir.path()));
        let fetcher = StubFetcher::new(dynamic_models);

        let models = discovery.discover_models(&fetcher).await;
        assert_eq!(models.len(), 2);
        assert!(models.iter().all(|m| m.provider == "test"));

        // Second call is served from the cache.
        let again = discovery.discover_models(&fetcher).await;
        assert_eq!(again, models);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn fetch_failure_falls_back_to_static() {
        let dir = tempfile::tempdir().unwrap();
        let discovery = ModelDiscovery::new("test", static_models(), &config(dir.path()));

        let models = discovery.discover_models(&StubFetcher::new(failing)).await;
        assert_eq!(models, static_models());
        assert!(discovery.cache().unwrap().get().is_none());
    }

    #[tokio::test]
    async fn empty_fetch_falls_back_to_static() {
        let dir = tempfile::tempdir().unwrap();
        let discovery = ModelDiscovery::new("test", static_models(), &config(dir.path()));
        let models = discovery
            .discover_models(&StubFetcher::new(|| Ok(vec![])))
            .await;
        assert_eq!(models, static_models());
        assert!(discovery.cache().unwrap().get().is_none());
    }

    struct StalledFetcher;

    #[async_trait]
    impl ModelFetcher for StalledFetcher {
        async fn fetch_models(&self) -> Result<Vec<ModelDescriptor>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            dynamic_models()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_fetch_times_out_to_static() {
        let dir = tempfile::tempdir().unwrap();
        let discovery = ModelDiscovery::new("test", static_models(), &config(dir.path()))
            .fetch_timeout(Duration::from_millis(500));

        let started = tokio::time::Instant::now();
        let models = discovery.discover_models(&StalledFetcher).await;

        assert_eq!(models, static_models());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(discovery.cache().unwrap().get().is_none());
    }

    #[tokio::test]
    async fn cache_disabled_always_fetches() {
        let dir = tempfile::tempdir().unwrap();
        let discovery = ModelDiscovery::new(
            "test",
            static_models(),
            &config(dir.path()).use_cache(false),
        );
        let fetcher = StubFetcher::new(dynamic_models);

        discovery.discover_models(&fetcher).await;
        discovery.discover_models(&fetcher).await;
        assert_eq!(fetcher.calls(), 2);
        assert!(discovery.cache().is_none());
    }

    #[tokio::test]
    async fn refresh_bypasses_cache_read() {
        let dir = tempfile::tempdir().unwrap();
        let discovery = ModelDiscovery::new("test", static_models(), &config(dir.path()));
        let fetcher = StubFetcher::new(dynamic_models);

        discovery.discover_models(&fetcher).await;
        discovery.refresh(&fetcher).await;
        assert_eq!(fetcher.calls(), 2);

        discovery.clear_cache();
        assert!(discovery.cache().unwrap().get().is_none());
    }

    #[test]
    fn deserializes_config() {
        let config: DiscoveryConfig =
            serde_json::from_str(r#"{"force_static": true, "cache_ttl_secs": 60}"#).unwrap();
        assert!(config.force_static);
        assert!(config.use_cache);
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
    }
}
