//! Gateway client with provider fallback.
//!
//! [`GatewayClient`] owns every configured provider keyed by tag and tries
//! them in order until one succeeds.
//!
//! # Provider Order
//!
//! ```text
//! explicit provider given? ──yes──► [explicit]
//!          │no
//!          ▼
//! preferred / fallback set? ─yes──► [preferred] + fallback_order
//!          │no                       (deduplicated, unconfigured tags skipped)
//!          ▼
//! every configured provider, in tag order
//! ```
//!
//! # Failure Handling
//!
//! A candidate is skipped (and recorded as a failure) when it reports
//! itself unavailable or, for embeddings, does not support them. Any error
//! from a candidate is recorded and the next one is tried. When every
//! candidate fails the caller gets
//! [`HuginnError::AllProvidersFailed`] listing each provider and its error.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use tracing::{debug, instrument, warn};

use crate::cache::ModelOwnerCache;
use crate::config::GatewayConfig;
use crate::error::ProviderFailure;
use crate::providers::{Provider, ProviderRegistry};
use crate::telemetry;
use crate::types::{
    CompletionRequest, CompletionResponse, EmbeddingRequest, EmbeddingResponse, ModelDescriptor,
};
use crate::{HuginnError, Result};

use super::GatewayBuilder;

/// Multi-provider client for completions and embeddings.
pub struct GatewayClient {
    providers: BTreeMap<String, Arc<dyn Provider>>,
    preferred: Option<String>,
    fallback_order: Vec<String>,
    owners: ModelOwnerCache,
}

impl GatewayClient {
    /// Create a new builder for configuring the gateway.
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// Build a gateway from configuration using the built-in providers.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        Self::from_config_with_registry(config, ProviderRegistry::with_builtin_providers())
    }

    /// Build a gateway from configuration with a custom factory registry.
    pub fn from_config_with_registry(
        config: &GatewayConfig,
        registry: ProviderRegistry,
    ) -> Result<Self> {
        let mut builder = GatewayBuilder::new()
            .registry(registry)
            .retry(config.retry.clone())
            .fallback_order(config.fallback_order.iter().cloned());
        if let Some(preferred) = &config.preferred_provider {
            builder = builder.preferred(preferred.clone());
        }
        for provider in config.providers.values() {
            builder = builder.provider_config(provider.clone());
        }
        builder.build()
    }

    pub(crate) fn new(
        providers: BTreeMap<String, Arc<dyn Provider>>,
        preferred: Option<String>,
        fallback_order: Vec<String>,
    ) -> Self {
        Self {
            providers,
            preferred,
            fallback_order,
            owners: ModelOwnerCache::new(),
        }
    }

    /// Configured provider tags, sorted.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// The provider registered under `tag`.
    pub fn provider(&self, tag: &str) -> Option<&Arc<dyn Provider>> {
        self.providers.get(tag)
    }

    pub fn preferred_provider(&self) -> Option<&str> {
        self.preferred.as_deref()
    }

    pub fn fallback_order(&self) -> &[String] {
        &self.fallback_order
    }

    /// Candidate provider tags for a request, in the order they are tried.
    ///
    /// An explicit tag yields just that tag, configured or not, so the
    /// caller can report it.
    pub fn provider_order(&self, explicit: Option<&str>) -> Vec<String> {
        if let Some(tag) = explicit {
            return vec![tag.to_string()];
        }

        if self.preferred.is_none() && self.fallback_order.is_empty() {
            return self.providers.keys().cloned().collect();
        }

        let mut order: Vec<String> = Vec::new();
        for tag in self.preferred.iter().chain(self.fallback_order.iter()) {
            if order.contains(tag) {
                continue;
            }
            if !self.providers.contains_key(tag) {
                debug!(provider = %tag, "skipping unconfigured provider in fallback order");
                continue;
            }
            order.push(tag.clone());
        }
        order
    }

    /// Complete text with provider fallback.
    #[instrument(skip(self, request), fields(operation = "complete", explicit = ?provider))]
    pub async fn complete(
        &self,
        request: &CompletionRequest,
        provider: Option<&str>,
    ) -> Result<CompletionResponse> {
        self.dispatch(
            "complete",
            provider,
            |_| true,
            move |p| async move { p.complete(request).await },
        )
        .await
    }

    /// Embed every input text with provider fallback.
    ///
    /// Providers without embedding support are skipped. A provider that
    /// returns the wrong number of vectors counts as failed.
    #[instrument(skip(self, request), fields(operation = "embed", batch = request.input.len(), explicit = ?provider))]
    pub async fn embed(
        &self,
        request: &EmbeddingRequest,
        provider: Option<&str>,
    ) -> Result<EmbeddingResponse> {
        if request.input.is_empty() {
            return Err(HuginnError::InvalidInput(
                "embedding request has no input".into(),
            ));
        }

        self.dispatch(
            "embed",
            provider,
            |p| p.supports_embeddings(),
            move |p| async move {
                let response = p.embed(request).await?;
                if response.embeddings.len() != request.input.len() {
                    return Err(HuginnError::InvalidInput(format!(
                        "expected {} embeddings, got {}",
                        request.input.len(),
                        response.embeddings.len()
                    )));
                }
                Ok(response)
            },
        )
        .await
    }

    /// Embed a batch of texts; output order matches `texts`.
    pub async fn embed_batch(
        &self,
        texts: &[&str],
        model: Option<&str>,
        provider: Option<&str>,
    ) -> Result<EmbeddingResponse> {
        let mut request = EmbeddingRequest::batch(texts.iter().copied());
        request.model = model.map(str::to_string);
        self.embed(&request, provider).await
    }

    /// Models from one provider, or from all providers when `provider` is
    /// `None`.
    ///
    /// Never fails: an unknown tag or a failing provider contributes an
    /// empty list.
    pub async fn list_models(&self, provider: Option<&str>) -> Vec<ModelDescriptor> {
        let targets: Vec<(&String, &Arc<dyn Provider>)> = match provider {
            Some(tag) => self.providers.get_key_value(tag).into_iter().collect(),
            None => self.providers.iter().collect(),
        };

        let results = join_all(targets.iter().map(|(tag, p)| async move {
            match p.list_models().await {
                Ok(models) => models,
                Err(e) => {
                    warn!(provider = %tag, error = %e, "failed to list models");
                    Vec::new()
                }
            }
        }))
        .await;

        results.into_iter().flatten().collect()
    }

    /// Tag of the first provider (in fallback order, then tag order) that
    /// lists `model_id`. Memoized.
    pub async fn get_provider_for_model(&self, model_id: &str) -> Option<String> {
        if let Some(tag) = self.owners.get(model_id) {
            return Some(tag);
        }

        let mut order = self.provider_order(None);
        for tag in self.providers.keys() {
            if !order.contains(tag) {
                order.push(tag.clone());
            }
        }

        for tag in order {
            let models = self.list_models(Some(&tag)).await;
            if models.iter().any(|m| m.id == model_id) {
                self.owners.insert(model_id, tag.clone());
                return Some(tag);
            }
        }
        None
    }

    /// Tags of providers currently reporting themselves available.
    pub async fn available_providers(&self) -> Vec<String> {
        let checks = join_all(
            self.providers
                .iter()
                .map(|(tag, p)| async move { (tag.clone(), p.is_available().await) }),
        )
        .await;
        checks
            .into_iter()
            .filter_map(|(tag, ok)| ok.then_some(tag))
            .collect()
    }

    /// Release every provider's resources.
    pub async fn cleanup(&self) {
        for (tag, provider) in &self.providers {
            debug!(provider = %tag, "cleaning up provider");
            provider.cleanup().await;
        }
        self.owners.clear();
    }

    /// Try candidates in order until one succeeds.
    async fn dispatch<T, E, F, Fut>(
        &self,
        operation: &'static str,
        explicit: Option<&str>,
        eligible: E,
        call: F,
    ) -> Result<T>
    where
        E: Fn(&dyn Provider) -> bool,
        F: Fn(Arc<dyn Provider>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let mut failures = Vec::new();

        for tag in self.provider_order(explicit) {
            let Some(provider) = self.providers.get(&tag) else {
                failures.push(ProviderFailure::new(
                    &tag,
                    HuginnError::Configuration(format!("provider '{tag}' is not configured")),
                ));
                continue;
            };

            if !eligible(provider.as_ref()) {
                Self::record_skip(operation, &tag, "unsupported");
                failures.push(ProviderFailure::new(&tag, HuginnError::Unsupported));
                continue;
            }

            if !provider.is_available().await {
                Self::record_skip(operation, &tag, "unavailable");
                failures.push(ProviderFailure::new(
                    &tag,
                    HuginnError::ProviderUnavailable(tag.clone()),
                ));
                continue;
            }

            match call(Arc::clone(provider)).await {
                Ok(result) => {
                    Self::record_request(operation, &tag, start, true);
                    return Ok(result);
                }
                Err(e) => {
                    warn!(provider = %tag, operation, error = %e, "provider failed, trying next");
                    Self::record_request(operation, &tag, start, false);
                    failures.push(ProviderFailure::new(&tag, e));
                }
            }
        }

        Self::record_request(operation, "none", start, false);
        Err(HuginnError::AllProvidersFailed { failures })
    }

    /// Record request outcome metrics (counter + histogram).
    fn record_request(operation: &'static str, provider: &str, start: Instant, ok: bool) {
        let status = if ok { "ok" } else { "error" };
        let elapsed = start.elapsed().as_secs_f64();
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "provider" => provider.to_owned(),
            "operation" => operation,
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
            "provider" => provider.to_owned(),
            "operation" => operation,
        )
        .record(elapsed);
    }

    fn record_skip(operation: &'static str, provider: &str, reason: &'static str) {
        debug!(provider, operation, reason, "skipping provider");
        metrics::counter!(telemetry::PROVIDER_SKIPS_TOTAL,
            "provider" => provider.to_owned(),
            "operation" => operation,
            "reason" => reason,
        )
        .increment(1);
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("providers", &self.provider_names())
            .field("preferred", &self.preferred)
            .field("fallback_order", &self.fallback_order)
            .finish()
    }
}
