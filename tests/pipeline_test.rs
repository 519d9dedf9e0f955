//! Integration tests for the cache-first embedding pipeline.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use huginn::{
    CompletionRequest, CompletionResponse, DimensionManager, EmbeddingCache,
    EmbeddingCacheConfig, EmbeddingPipeline, EmbeddingRequest, EmbeddingResponse, GatewayClient,
    HuginnError, ModelDescriptor, ModelInfo, PipelineConfig, Provider, Result,
};

// ============================================================================
// Mock provider
// ============================================================================

/// Embeds each text as `[len, 1.0, 1.0, ...]` with a fixed width, and
/// records every request it receives.
struct RecordingProvider {
    width: usize,
    poison: bool,
    requests: Mutex<Vec<EmbeddingRequest>>,
}

impl RecordingProvider {
    fn new(width: usize) -> Self {
        Self {
            width,
            poison: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn poisoned(mut self) -> Self {
        self.poison = true;
        self
    }

    fn requests(&self) -> Vec<EmbeddingRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn embedded_texts(&self) -> usize {
        self.requests().iter().map(|r| r.input.len()).sum()
    }
}

#[async_trait]
impl Provider for RecordingProvider {
    fn name(&self) -> &str {
        "recording"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse> {
        Err(HuginnError::Unsupported)
    }

    async fn embed(&self, request: &EmbeddingRequest) -> Result<EmbeddingResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let embeddings = request
            .input
            .iter()
            .map(|text| {
                let mut v = vec![1.0; self.width];
                v[0] = if self.poison { f32::NAN } else { text.len() as f32 };
                v
            })
            .collect();
        Ok(EmbeddingResponse {
            embeddings,
            provider: "recording".to_string(),
            model: request.model.clone().unwrap_or_default(),
            usage: None,
        })
    }

    fn supports_embeddings(&self) -> bool {
        true
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>> {
        Ok(Vec::new())
    }

    async fn is_available(&self) -> bool {
        true
    }
}

fn gateway(provider: Arc<RecordingProvider>) -> Arc<GatewayClient> {
    Arc::new(GatewayClient::builder().provider(provider).build().unwrap())
}

fn manager() -> DimensionManager {
    let mut dm = DimensionManager::new();
    dm.register_model(ModelInfo::new("fixed-4", 4));
    dm.register_model(ModelInfo::new("flex-8", 8).custom_dimensions(Some(2), Some(8)));
    dm
}

fn cache(dir: &std::path::Path) -> EmbeddingCache {
    EmbeddingCache::open(EmbeddingCacheConfig::new(dir)).unwrap()
}

// ============================================================================
// Caching
// ============================================================================

#[tokio::test]
async fn second_embed_is_served_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(RecordingProvider::new(4));
    let pipeline = EmbeddingPipeline::new(gateway(provider.clone()), manager(), Some(cache(dir.path())));

    let first = pipeline.embed("hello", "fixed-4").await.unwrap();
    assert!(!first.cached);
    assert_eq!(first.values, vec![5.0, 1.0, 1.0, 1.0]);

    let second = pipeline.embed("hello", "fixed-4").await.unwrap();
    assert!(second.cached);
    assert_eq!(second.values, first.values);
    assert_eq!(provider.embedded_texts(), 1);
}

#[tokio::test]
async fn without_cache_every_call_reaches_the_provider() {
    let provider = Arc::new(RecordingProvider::new(4));
    let pipeline = EmbeddingPipeline::new(gateway(provider.clone()), manager(), None);

    pipeline.embed("hello", "fixed-4").await.unwrap();
    pipeline.embed("hello", "fixed-4").await.unwrap();

    assert_eq!(provider.embedded_texts(), 2);
    assert!(pipeline.cache_stats().await.is_none());
    assert_eq!(pipeline.invalidate_model("fixed-4").await, 0);
}

#[tokio::test]
async fn batch_sends_only_misses_and_keeps_order() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(RecordingProvider::new(4));
    let pipeline = EmbeddingPipeline::new(gateway(provider.clone()), manager(), Some(cache(dir.path())));

    pipeline.embed("bb", "fixed-4").await.unwrap();

    let results = pipeline
        .embed_batch(&["a", "bb", "ccc"], "fixed-4")
        .await
        .unwrap();

    let firsts: Vec<f32> = results.iter().map(|e| e.values[0]).collect();
    assert_eq!(firsts, vec![1.0, 2.0, 3.0]);
    let cached: Vec<bool> = results.iter().map(|e| e.cached).collect();
    assert_eq!(cached, vec![false, true, false]);

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].input, vec!["a", "ccc"]);
}

#[tokio::test]
async fn fully_cached_batch_makes_no_request() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(RecordingProvider::new(4));
    let pipeline = EmbeddingPipeline::new(gateway(provider.clone()), manager(), Some(cache(dir.path())));

    pipeline.embed_batch(&["x", "y"], "fixed-4").await.unwrap();
    let again = pipeline.embed_batch(&["y", "x"], "fixed-4").await.unwrap();

    assert!(again.iter().all(|e| e.cached));
    assert_eq!(provider.requests().len(), 1);
}

#[tokio::test]
async fn invalidate_model_forces_recompute() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(RecordingProvider::new(4));
    let pipeline = EmbeddingPipeline::new(gateway(provider.clone()), manager(), Some(cache(dir.path())));

    pipeline.embed("hello", "fixed-4").await.unwrap();
    assert_eq!(pipeline.cache_stats().await.unwrap().entries, 1);
    assert_eq!(pipeline.invalidate_model("fixed-4").await, 1);

    let again = pipeline.embed("hello", "fixed-4").await.unwrap();
    assert!(!again.cached);
    assert_eq!(provider.embedded_texts(), 2);
}

// ============================================================================
// Validation and normalization
// ============================================================================

#[tokio::test]
async fn non_finite_vector_is_rejected_and_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(RecordingProvider::new(4).poisoned());
    let pipeline = EmbeddingPipeline::new(gateway(provider), manager(), Some(cache(dir.path())));

    let err = pipeline.embed("hello", "fixed-4").await.unwrap_err();
    assert!(matches!(err, HuginnError::InvalidVector(_)));
    assert_eq!(pipeline.cache_stats().await.unwrap().entries, 0);
}

#[tokio::test]
async fn wrong_width_for_known_model_is_a_mismatch() {
    let provider = Arc::new(RecordingProvider::new(6));
    let pipeline = EmbeddingPipeline::new(gateway(provider), manager(), None);

    let err = pipeline.embed("hello", "fixed-4").await.unwrap_err();
    match err {
        HuginnError::DimensionMismatch { model, .. } => assert_eq!(model, "fixed-4"),
        other => panic!("expected DimensionMismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn validation_can_be_disabled() {
    let provider = Arc::new(RecordingProvider::new(6));
    let pipeline = EmbeddingPipeline::new(gateway(provider), manager(), None)
        .with_config(PipelineConfig::new().validate(false));

    let embedding = pipeline.embed("hello", "fixed-4").await.unwrap();
    assert_eq!(embedding.dimensions, 6);
}

#[tokio::test]
async fn normalize_to_model_pads_and_truncates() {
    let provider = Arc::new(RecordingProvider::new(6));
    let pipeline = EmbeddingPipeline::new(gateway(provider), manager(), None)
        .with_config(PipelineConfig::new().normalize_to_model(true));

    let embedding = pipeline.embed("hello", "fixed-4").await.unwrap();
    assert_eq!(embedding.values, vec![5.0, 1.0, 1.0, 1.0]);

    let provider = Arc::new(RecordingProvider::new(2));
    let pipeline = EmbeddingPipeline::new(gateway(provider), manager(), None)
        .with_config(PipelineConfig::new().normalize_to_model(true));

    let embedding = pipeline.embed("hey", "fixed-4").await.unwrap();
    assert_eq!(embedding.values, vec![3.0, 1.0, 0.0, 0.0]);
}

#[tokio::test]
async fn target_dimensions_are_requested_from_flexible_models() {
    let provider = Arc::new(RecordingProvider::new(8));
    let pipeline = EmbeddingPipeline::new(gateway(provider.clone()), manager(), None)
        .with_config(PipelineConfig::new().target_dimensions(4));

    let embedding = pipeline.embed("hello", "flex-8").await.unwrap();
    assert_eq!(embedding.dimensions, 4);
    assert_eq!(provider.requests()[0].dimensions, Some(4));
}

#[tokio::test]
async fn out_of_range_target_is_not_requested() {
    let provider = Arc::new(RecordingProvider::new(8));
    let pipeline = EmbeddingPipeline::new(gateway(provider.clone()), manager(), None)
        .with_config(PipelineConfig::new().target_dimensions(16));

    let err = pipeline.embed("hello", "flex-8").await.unwrap_err();
    assert!(matches!(err, HuginnError::DimensionMismatch { .. }));
    assert_eq!(provider.requests()[0].dimensions, None);
}

#[tokio::test]
async fn cached_vector_at_another_width_is_recomputed() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(RecordingProvider::new(8));

    let native = EmbeddingPipeline::new(gateway(provider.clone()), manager(), Some(cache(dir.path())));
    assert_eq!(native.embed("hello", "flex-8").await.unwrap().dimensions, 8);
    drop(native);

    let reduced = EmbeddingPipeline::new(gateway(provider.clone()), manager(), Some(cache(dir.path())))
        .with_config(PipelineConfig::new().target_dimensions(4));
    let first = reduced.embed("hello", "flex-8").await.unwrap();
    assert!(!first.cached);
    assert_eq!(first.dimensions, 4);

    let second = reduced.embed("hello", "flex-8").await.unwrap();
    assert!(second.cached);
    assert_eq!(second.values, first.values);
    assert_eq!(provider.embedded_texts(), 2);
}

#[tokio::test]
async fn unknown_models_pass_through() {
    let provider = Arc::new(RecordingProvider::new(3));
    let pipeline = EmbeddingPipeline::new(gateway(provider), manager(), None);

    let embedding = pipeline.embed("hello", "mystery").await.unwrap();
    assert_eq!(embedding.dimensions, 3);
    assert_eq!(embedding.model, "mystery");
}

#[tokio::test]
async fn cached_vectors_are_comparable() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(RecordingProvider::new(4));
    let pipeline = EmbeddingPipeline::new(gateway(provider), manager(), Some(cache(dir.path())));

    let a = pipeline.embed("same", "fixed-4").await.unwrap();
    let b = pipeline.embed("same", "fixed-4").await.unwrap();
    let sim = EmbeddingPipeline::similarity(&a.values, &b.values);
    assert!((sim - 1.0).abs() < 1e-6);
}
