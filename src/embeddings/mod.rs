//! Embedding services: dimension contracts, the disk cache, and the
//! cache-first pipeline that ties them to the gateway.

pub mod cache;
pub mod dimensions;
pub mod eviction;
pub mod pipeline;

pub use cache::{
    CacheEntry, CacheStats, DEFAULT_MAX_SIZE, DEFAULT_TTL, EmbeddingCache, EmbeddingCacheConfig,
    cache_key, default_cache_dir,
};
pub use dimensions::{DimensionCheck, DimensionManager, ModelInfo, StorageEstimate};
pub use eviction::EvictionStrategy;
pub use pipeline::{EmbeddingPipeline, PipelineConfig};
