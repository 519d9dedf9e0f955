//! Cache-first embedding pipeline.
//!
//! ```text
//! embed(text, model)
//!      │
//!      ▼
//! cache hit? ──yes──► Embedding { cached: true }
//!      │no
//!      ▼
//! gateway.embed ──► finite? ──► normalize to target ──► dimension check ──► cache.put
//!                   (InvalidVector)                     (DimensionMismatch)
//! ```
//!
//! Validation failures surface immediately; they are not retried and no
//! other provider is tried.

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::cache::{CacheStats, EmbeddingCache};
use super::dimensions::DimensionManager;
use crate::gateway::GatewayClient;
use crate::types::{Embedding, EmbeddingRequest};
use crate::{HuginnError, Result};

/// Post-processing applied to freshly computed embeddings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Reject non-finite vectors and dimension-contract violations. Default: true.
    pub validate: bool,
    /// Pad/truncate to the model's native dimensions when no explicit
    /// target is set. Default: false.
    pub normalize_to_model: bool,
    /// Pad/truncate every vector to this size.
    pub target_dimensions: Option<usize>,
    /// Route embeddings to this provider instead of the fallback order.
    pub provider: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            validate: true,
            normalize_to_model: false,
            target_dimensions: None,
            provider: None,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(mut self, enabled: bool) -> Self {
        self.validate = enabled;
        self
    }

    pub fn normalize_to_model(mut self, enabled: bool) -> Self {
        self.normalize_to_model = enabled;
        self
    }

    pub fn target_dimensions(mut self, dims: usize) -> Self {
        self.target_dimensions = Some(dims);
        self
    }

    pub fn provider(mut self, tag: impl Into<String>) -> Self {
        self.provider = Some(tag.into());
        self
    }
}

/// Embedding service composing the gateway, dimension contracts, and an
/// optional disk cache.
pub struct EmbeddingPipeline {
    gateway: Arc<GatewayClient>,
    dimensions: DimensionManager,
    cache: Option<Mutex<EmbeddingCache>>,
    config: PipelineConfig,
}

impl EmbeddingPipeline {
    pub fn new(
        gateway: Arc<GatewayClient>,
        dimensions: DimensionManager,
        cache: Option<EmbeddingCache>,
    ) -> Self {
        Self {
            gateway,
            dimensions,
            cache: cache.map(Mutex::new),
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn dimensions(&self) -> &DimensionManager {
        &self.dimensions
    }

    pub fn gateway(&self) -> &GatewayClient {
        &self.gateway
    }

    /// Embed one text, consulting the cache first.
    pub async fn embed(&self, text: &str, model: &str) -> Result<Embedding> {
        if let Some(values) = self.cached(text, model).await {
            debug!(model, "embedding served from cache");
            return Ok(cached_embedding(values, model));
        }

        let request = self.request(EmbeddingRequest::new(text), model);
        let response = self
            .gateway
            .embed(&request, self.config.provider.as_deref())
            .await?;
        let raw = response
            .embeddings
            .into_iter()
            .next()
            .ok_or(HuginnError::EmptyResponse)?;

        let values = self.finalize(raw, model)?;
        self.store(text, model, &values, &response.provider).await;
        Ok(Embedding::new(values, model))
    }

    /// Embed many texts; output order matches `texts`.
    ///
    /// Cache hits are served locally; all misses go to the gateway in a
    /// single batch.
    pub async fn embed_batch(&self, texts: &[&str], model: &str) -> Result<Vec<Embedding>> {
        let mut results: Vec<Option<Embedding>> = Vec::with_capacity(texts.len());
        let mut misses: Vec<usize> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            match self.cached(text, model).await {
                Some(values) => results.push(Some(cached_embedding(values, model))),
                None => {
                    results.push(None);
                    misses.push(i);
                }
            }
        }

        if !misses.is_empty() {
            debug!(
                model,
                hits = texts.len() - misses.len(),
                misses = misses.len(),
                "embedding batch"
            );
            let request = self.request(
                EmbeddingRequest::batch(misses.iter().map(|&i| texts[i])),
                model,
            );
            let response = self
                .gateway
                .embed(&request, self.config.provider.as_deref())
                .await?;

            for (&i, raw) in misses.iter().zip(response.embeddings) {
                let values = self.finalize(raw, model)?;
                self.store(texts[i], model, &values, &response.provider)
                    .await;
                results[i] = Some(Embedding::new(values, model));
            }
        }

        results
            .into_iter()
            .map(|r| r.ok_or(HuginnError::EmptyResponse))
            .collect()
    }

    /// Cache summary, or `None` when caching is disabled.
    pub async fn cache_stats(&self) -> Option<CacheStats> {
        match &self.cache {
            Some(cache) => Some(cache.lock().await.get_stats()),
            None => None,
        }
    }

    /// Drop every cached embedding for `model`. Returns how many were removed.
    pub async fn invalidate_model(&self, model: &str) -> usize {
        match &self.cache {
            Some(cache) => cache.lock().await.invalidate_model(model),
            None => 0,
        }
    }

    /// Cosine similarity of two vectors.
    ///
    /// Vectors of different length, or with zero magnitude, score `0.0`.
    pub fn similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }

    /// Target size for `model`: the explicit target, else the model's
    /// native size when `normalize_to_model` is set.
    fn target_dimensions(&self, model: &str) -> Option<usize> {
        self.config.target_dimensions.or_else(|| {
            self.config
                .normalize_to_model
                .then(|| self.dimensions.get_dimensions(model))
                .flatten()
        })
    }

    /// Attach the model, and ask for the target size when the model can
    /// produce it natively.
    fn request(&self, request: EmbeddingRequest, model: &str) -> EmbeddingRequest {
        let request = request.model(model);
        match (
            self.config.target_dimensions,
            self.dimensions.get_model_info(model),
        ) {
            (Some(target), Some(info))
                if info.supports_custom_dimensions && info.check(target).valid =>
            {
                request.dimensions(target)
            }
            _ => request,
        }
    }

    fn finalize(&self, raw: Vec<f32>, model: &str) -> Result<Vec<f32>> {
        if self.config.validate {
            let check = self.dimensions.validate_vector(&raw, None);
            if !check.valid {
                return Err(HuginnError::InvalidVector(check.reason.unwrap_or_default()));
            }
        }

        let values = match self.target_dimensions(model) {
            Some(target) if target != raw.len() => {
                debug!(model, from = raw.len(), to = target, "normalizing embedding");
                self.dimensions.normalize_vector(&raw, target)
            }
            _ => raw,
        };

        if self.config.validate {
            let check = self.dimensions.validate_dimensions(model, values.len());
            if !check.valid {
                return Err(HuginnError::DimensionMismatch {
                    model: model.to_string(),
                    reason: check.reason.unwrap_or_default(),
                });
            }
        }
        Ok(values)
    }

    /// Cached vector for (text, model), unless it was stored at a width
    /// other than this pipeline's target.
    async fn cached(&self, text: &str, model: &str) -> Option<Vec<f32>> {
        let cache = self.cache.as_ref()?;
        let values = cache.lock().await.get(text, model)?;
        match self.target_dimensions(model) {
            Some(target) if target != values.len() => {
                debug!(
                    model,
                    cached = values.len(),
                    target,
                    "cached embedding width differs, recomputing"
                );
                None
            }
            _ => Some(values),
        }
    }

    async fn store(&self, text: &str, model: &str, values: &[f32], provider: &str) {
        let Some(cache) = &self.cache else {
            return;
        };
        let metadata = serde_json::json!({ "provider": provider });
        if let Err(e) = cache.lock().await.put(text, model, values, Some(metadata)) {
            warn!(model, error = %e, "failed to cache embedding");
        }
    }
}

fn cached_embedding(values: Vec<f32>, model: &str) -> Embedding {
    let mut embedding = Embedding::new(values, model);
    embedding.cached = true;
    embedding
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity() {
        let sim = EmbeddingPipeline::similarity(&[1.0, 0.0], &[1.0, 0.0]);
        assert!((sim - 1.0).abs() < 1e-6);
        let orthogonal = EmbeddingPipeline::similarity(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(orthogonal.abs() < 1e-6);
        let opposite = EmbeddingPipeline::similarity(&[1.0, 2.0], &[-1.0, -2.0]);
        assert!((opposite + 1.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_similarity_is_zero() {
        assert_eq!(EmbeddingPipeline::similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(EmbeddingPipeline::similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(EmbeddingPipeline::similarity(&[], &[]), 0.0);
    }

    #[test]
    fn config_defaults() {
        let config = PipelineConfig::default();
        assert!(config.validate);
        assert!(!config.normalize_to_model);
        assert!(config.target_dimensions.is_none());
    }
}
