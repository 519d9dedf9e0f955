//! Embedding model dimensionality contracts.
//!
//! A [`DimensionManager`] maps model names to a [`ModelInfo`] describing
//! how many components that model's vectors have (or, for models with
//! configurable output size, which sizes are allowed). The pipeline uses
//! it to check and pad/truncate vectors before they are cached.

use serde::{Deserialize, Serialize};

/// Dimension assumed by storage estimates for unknown models.
pub const DEFAULT_ESTIMATE_DIMENSIONS: usize = 1536;

/// Bytes per stored vector component (32-bit float).
const BYTES_PER_COMPONENT: usize = 4;

/// Dimensionality contract for one embedding model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    /// Native output size.
    pub dimensions: usize,
    /// Maximum input length in tokens, if known.
    #[serde(default)]
    pub max_tokens: Option<usize>,
    /// Whether the provider truncates over-long input instead of failing.
    #[serde(default)]
    pub supports_truncation: bool,
    /// Whether callers may request a different output size.
    #[serde(default)]
    pub supports_custom_dimensions: bool,
    #[serde(default)]
    pub min_custom_dimensions: Option<usize>,
    #[serde(default)]
    pub max_custom_dimensions: Option<usize>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl ModelInfo {
    /// A fixed-dimension model.
    pub fn new(name: impl Into<String>, dimensions: usize) -> Self {
        Self {
            name: name.into(),
            dimensions,
            max_tokens: None,
            supports_truncation: false,
            supports_custom_dimensions: false,
            min_custom_dimensions: None,
            max_custom_dimensions: None,
            metadata: None,
        }
    }

    pub fn max_tokens(mut self, tokens: usize) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    pub fn supports_truncation(mut self, enabled: bool) -> Self {
        self.supports_truncation = enabled;
        self
    }

    /// Allow custom output sizes within `[min, max]`; `None` leaves that
    /// side unbounded.
    pub fn custom_dimensions(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.supports_custom_dimensions = true;
        self.min_custom_dimensions = min;
        self.max_custom_dimensions = max;
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Whether `dimensions` satisfies this model's contract.
    pub fn check(&self, dimensions: usize) -> DimensionCheck {
        if !self.supports_custom_dimensions {
            return if dimensions == self.dimensions {
                DimensionCheck::ok()
            } else {
                DimensionCheck::invalid(format!(
                    "model {} requires exactly {} dimensions, got {}",
                    self.name, self.dimensions, dimensions
                ))
            };
        }

        if let Some(min) = self.min_custom_dimensions {
            if dimensions < min {
                return DimensionCheck::invalid(format!(
                    "model {} requires at least {} dimensions, got {}",
                    self.name, min, dimensions
                ));
            }
        }
        if let Some(max) = self.max_custom_dimensions {
            if dimensions > max {
                return DimensionCheck::invalid(format!(
                    "model {} supports at most {} dimensions, got {}",
                    self.name, max, dimensions
                ));
            }
        }
        DimensionCheck::ok()
    }
}

/// Outcome of a dimension or vector check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionCheck {
    pub valid: bool,
    /// Why the check failed; `None` when valid.
    pub reason: Option<String>,
}

impl DimensionCheck {
    pub fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Storage needed for a number of embeddings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageEstimate {
    pub dimensions: usize,
    pub bytes_per_embedding: usize,
    pub total_bytes: u64,
    pub total_mb: f64,
    pub total_gb: f64,
}

/// Registry of embedding model dimension contracts.
///
/// Models keep their registration order; re-registering a name replaces
/// its contract in place.
#[derive(Debug, Clone, Default)]
pub struct DimensionManager {
    models: Vec<ModelInfo>,
}

impl DimensionManager {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with well-known embedding models.
    pub fn with_defaults() -> Self {
        let mut manager = Self::new();
        manager.register_model(
            ModelInfo::new("text-embedding-ada-002", 1536)
                .max_tokens(8191)
                .supports_truncation(true),
        );
        manager.register_model(
            ModelInfo::new("text-embedding-3-small", 1536)
                .max_tokens(8191)
                .supports_truncation(true)
                .custom_dimensions(Some(256), Some(1536)),
        );
        manager.register_model(
            ModelInfo::new("text-embedding-3-large", 3072)
                .max_tokens(8191)
                .supports_truncation(true)
                .custom_dimensions(Some(256), Some(3072)),
        );
        manager.register_model(ModelInfo::new("nomic-embed-text", 768).max_tokens(8192));
        manager.register_model(ModelInfo::new("mxbai-embed-large", 1024).max_tokens(512));
        manager.register_model(ModelInfo::new("all-MiniLM-L6-v2", 384).max_tokens(256));
        manager
    }

    /// Register or replace a model's contract.
    pub fn register_model(&mut self, info: ModelInfo) {
        match self.models.iter_mut().find(|m| m.name == info.name) {
            Some(existing) => *existing = info,
            None => self.models.push(info),
        }
    }

    /// Remove a model's contract. Returns whether it was registered.
    pub fn unregister_model(&mut self, name: &str) -> bool {
        let before = self.models.len();
        self.models.retain(|m| m.name != name);
        self.models.len() != before
    }

    pub fn get_model_info(&self, name: &str) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn get_dimensions(&self, name: &str) -> Option<usize> {
        self.get_model_info(name).map(|m| m.dimensions)
    }

    /// Registered models in registration order.
    pub fn list_models(&self) -> &[ModelInfo] {
        &self.models
    }

    /// Check `dimensions` against `model`'s contract.
    ///
    /// Unknown models always pass.
    pub fn validate_dimensions(&self, model: &str, dimensions: usize) -> DimensionCheck {
        match self.get_model_info(model) {
            Some(info) => info.check(dimensions),
            None => DimensionCheck::ok(),
        }
    }

    /// Right-pad with `0.0` or truncate `vector` to `target` components.
    pub fn normalize_vector(&self, vector: &[f32], target: usize) -> Vec<f32> {
        let mut out = vector[..vector.len().min(target)].to_vec();
        out.resize(target, 0.0);
        out
    }

    /// Check that `vector` is non-empty and finite.
    ///
    /// With a known `model`, the length must equal the model's native
    /// dimensions exactly, even when it accepts custom sizes.
    pub fn validate_vector(&self, vector: &[f32], model: Option<&str>) -> DimensionCheck {
        if vector.is_empty() {
            return DimensionCheck::invalid("vector is empty");
        }
        if let Some(index) = vector.iter().position(|v| !v.is_finite()) {
            return DimensionCheck::invalid(format!(
                "vector contains non-finite value {} at index {}",
                vector[index], index
            ));
        }
        if let Some(info) = model.and_then(|m| self.get_model_info(m)) {
            if vector.len() != info.dimensions {
                return DimensionCheck::invalid(format!(
                    "model {} produces {} dimensions, vector has {}",
                    info.name,
                    info.dimensions,
                    vector.len()
                ));
            }
        }
        DimensionCheck::ok()
    }

    /// First registered model that can produce `target_dimensions` and
    /// accepts at least `max_tokens` input tokens.
    pub fn suggest_model(
        &self,
        target_dimensions: usize,
        max_tokens: Option<usize>,
    ) -> Option<&ModelInfo> {
        self.models.iter().find(|info| {
            let tokens_ok = match (max_tokens, info.max_tokens) {
                (Some(wanted), Some(limit)) => limit >= wanted,
                _ => true,
            };
            tokens_ok && info.check(target_dimensions).valid
        })
    }

    /// Storage for `count` embeddings of `model` at 4 bytes per component.
    pub fn estimate_storage_size(&self, model: &str, count: u64) -> StorageEstimate {
        let dimensions = self
            .get_dimensions(model)
            .unwrap_or(DEFAULT_ESTIMATE_DIMENSIONS);
        let bytes_per_embedding = dimensions * BYTES_PER_COMPONENT;
        let total_bytes = bytes_per_embedding as u64 * count;
        let total_mb = total_bytes as f64 / (1024.0 * 1024.0);
        StorageEstimate {
            dimensions,
            bytes_per_embedding,
            total_bytes,
            total_mb,
            total_gb: total_mb / 1024.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_pads_and_truncates() {
        let dm = DimensionManager::new();
        assert_eq!(
            dm.normalize_vector(&[1.0, 2.0], 5),
            vec![1.0, 2.0, 0.0, 0.0, 0.0]
        );
        assert_eq!(
            dm.normalize_vector(&[1.0, 2.0, 3.0, 4.0, 5.0], 3),
            vec![1.0, 2.0, 3.0]
        );
        assert_eq!(dm.normalize_vector(&[], 3), vec![0.0, 0.0, 0.0]);
        assert_eq!(dm.normalize_vector(&[1.0, 2.0], 2), vec![1.0, 2.0]);
        assert!(dm.normalize_vector(&[1.0], 0).is_empty());
    }

    #[test]
    fn fixed_model_requires_exact_size() {
        let dm = DimensionManager::with_defaults();
        let check = dm.validate_dimensions("text-embedding-ada-002", 512);
        assert!(!check.valid);
        assert!(check.reason.unwrap().contains("1536"));
        assert!(dm.validate_dimensions("text-embedding-ada-002", 1536).valid);
    }

    #[test]
    fn custom_model_checks_range() {
        let mut dm = DimensionManager::new();
        dm.register_model(ModelInfo::new("ranged", 1536).custom_dimensions(Some(256), Some(1536)));

        assert!(dm.validate_dimensions("ranged", 256).valid);
        assert!(dm.validate_dimensions("ranged", 1536).valid);

        let low = dm.validate_dimensions("ranged", 128);
        assert!(!low.valid);
        assert!(low.reason.unwrap().contains("256"));

        let high = dm.validate_dimensions("ranged", 2048);
        assert!(!high.valid);
        assert!(high.reason.unwrap().contains("1536"));
    }

    #[test]
    fn unbounded_custom_range() {
        let mut dm = DimensionManager::new();
        dm.register_model(ModelInfo::new("open", 64).custom_dimensions(None, Some(100)));
        assert!(dm.validate_dimensions("open", 1).valid);
        assert!(!dm.validate_dimensions("open", 101).valid);
    }

    #[test]
    fn unknown_model_is_permissive() {
        let dm = DimensionManager::new();
        assert!(dm.validate_dimensions("mystery", 7).valid);
        assert!(dm.validate_vector(&[0.5; 7], Some("mystery")).valid);
    }

    #[test]
    fn validate_vector_rejects_bad_values() {
        let dm = DimensionManager::new();
        assert!(!dm.validate_vector(&[], None).valid);
        assert!(!dm.validate_vector(&[1.0, f32::NAN], None).valid);
        assert!(!dm.validate_vector(&[f32::INFINITY], None).valid);
        assert!(dm.validate_vector(&[0.0, -1.5], None).valid);
    }

    #[test]
    fn validate_vector_is_strict_for_custom_models() {
        let dm = DimensionManager::with_defaults();
        // 512 is an allowed custom size, but vector validation wants the native size.
        assert!(dm.validate_dimensions("text-embedding-3-small", 512).valid);
        assert!(
            !dm.validate_vector(&vec![0.1; 512], Some("text-embedding-3-small"))
                .valid
        );
        assert!(
            dm.validate_vector(&vec![0.1; 1536], Some("text-embedding-3-small"))
                .valid
        );
    }

    #[test]
    fn reregistration_overwrites_in_place() {
        let mut dm = DimensionManager::new();
        dm.register_model(ModelInfo::new("a", 10));
        dm.register_model(ModelInfo::new("b", 20));
        dm.register_model(ModelInfo::new("a", 30));

        assert_eq!(dm.get_dimensions("a"), Some(30));
        assert_eq!(dm.list_models()[0].name, "a");
        assert!(dm.unregister_model("a"));
        assert!(!dm.unregister_model("a"));
        assert_eq!(dm.list_models().len(), 1);
    }

    #[test]
    fn suggest_model_respects_order_and_tokens() {
        let dm = DimensionManager::with_defaults();
        assert_eq!(
            dm.suggest_model(1536, None).unwrap().name,
            "text-embedding-ada-002"
        );
        assert_eq!(
            dm.suggest_model(512, None).unwrap().name,
            "text-embedding-3-small"
        );
        assert_eq!(dm.suggest_model(768, Some(8192)).unwrap().name, "nomic-embed-text");
        assert_eq!(dm.suggest_model(384, Some(200)).unwrap().name, "text-embedding-3-small");
        assert!(dm.suggest_model(100_000, None).is_none());
    }

    #[test]
    fn storage_estimate() {
        let dm = DimensionManager::with_defaults();
        let est = dm.estimate_storage_size("all-MiniLM-L6-v2", 1000);
        assert_eq!(est.dimensions, 384);
        assert_eq!(est.bytes_per_embedding, 1536);
        assert_eq!(est.total_bytes, 1_536_000);

        let unknown = dm.estimate_storage_size("mystery", 1024 * 1024);
        assert_eq!(unknown.dimensions, DEFAULT_ESTIMATE_DIMENSIONS);
        assert!((unknown.total_mb - 6144.0).abs() < 1e-9);
        assert!((unknown.total_gb - 6.0).abs() < 1e-9);
    }
}
