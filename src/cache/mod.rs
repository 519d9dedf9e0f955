//! Caching subsystem.
//!
//! - [`discovery::ModelDiscoveryCache`]: one JSON file per provider holding
//!   its last dynamically discovered model list, bounded by a TTL.
//!
//! - [`ModelOwnerCache`]: ephemeral in-memory memo of which provider owns a
//!   model id, used by
//!   [`GatewayClient::get_provider_for_model()`](crate::GatewayClient::get_provider_for_model)
//!   to avoid re-listing every provider on each lookup.
//!
//! The embedding cache lives in [`crate::embeddings::cache`].

pub mod discovery;

pub use discovery::{DEFAULT_DISCOVERY_TTL, ModelDiscoveryCache, default_discovery_dir};

use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default maximum number of entries in the model owner cache.
const DEFAULT_OWNER_CACHE_MAX: u64 = 1_000;

/// Default time-to-live for model owner lookups.
const DEFAULT_OWNER_CACHE_TTL: Duration = Duration::from_secs(300);

/// Thread-safe memo of model id → provider tag.
///
/// Bounded LRU + TTL (moka), so a provider that drops a model is noticed
/// once the entry expires.
pub struct ModelOwnerCache {
    entries: moka::sync::Cache<String, String>,
}

impl ModelOwnerCache {
    /// Create an empty cache with default capacity and TTL.
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_OWNER_CACHE_TTL)
    }

    /// Create a cache with a custom TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: moka::sync::Cache::builder()
                .max_capacity(DEFAULT_OWNER_CACHE_MAX)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Look up the provider that owns `model`.
    pub fn get(&self, model: &str) -> Option<String> {
        self.entries.get(model)
    }

    /// Record that `provider` owns `model`.
    pub fn insert(&self, model: impl Into<String>, provider: impl Into<String>) {
        self.entries.insert(model.into(), provider.into());
    }

    /// Evict all entries.
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }
}

impl Default for ModelOwnerCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Current wall-clock time as fractional unix seconds.
pub(crate) fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Write `bytes` to `path` via a sibling temp file and rename.
///
/// Creates the parent directory if needed. A crash mid-write leaves the
/// previous file intact.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_cache_round_trip() {
        let cache = ModelOwnerCache::new();
        assert!(cache.get("gpt-4o").is_none());
        cache.insert("gpt-4o", "openai");
        assert_eq!(cache.get("gpt-4o").as_deref(), Some("openai"));
        cache.clear();
        assert!(cache.get("gpt-4o").is_none());
    }

    #[test]
    fn write_atomic_replaces_content_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("index.json");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert!(!dir.path().join("nested").join("index.json.tmp").exists());
    }
}
