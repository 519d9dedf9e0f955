//! Disk-persisted model discovery cache.
//!
//! One JSON file per provider, `<cache_dir>/<provider>_models.json`:
//!
//! ```json
//! { "timestamp": 1718000000.5, "models": [ { "id": "...", ... } ] }
//! ```
//!
//! Reads fail closed: a missing file, unreadable or corrupt JSON, missing
//! fields, an expired timestamp, or a single malformed model entry all make
//! [`ModelDiscoveryCache::get()`] return `None`. Writes never raise; a
//! failed write is logged and the cache simply stays cold.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{unix_now, write_atomic};
use crate::types::ModelDescriptor;

/// Default time-to-live for discovered model lists: 24 hours.
pub const DEFAULT_DISCOVERY_TTL: Duration = Duration::from_secs(24 * 3600);

/// Default directory for discovery cache files: `~/.cache/huginn/models`.
pub fn default_discovery_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("huginn")
        .join("models")
}

#[derive(Serialize, Deserialize)]
struct CacheRecord {
    timestamp: f64,
    models: Vec<ModelDescriptor>,
}

/// TTL'd model list cache for a single provider.
#[derive(Debug, Clone)]
pub struct ModelDiscoveryCache {
    provider: String,
    path: PathBuf,
    ttl: Duration,
}

impl ModelDiscoveryCache {
    /// Cache for `provider` stored under `cache_dir`.
    pub fn new(provider: impl Into<String>, cache_dir: impl AsRef<Path>, ttl: Duration) -> Self {
        let provider = provider.into();
        let path = cache_dir
            .as_ref()
            .join(format!("{}_models.json", sanitize(&provider)));
        Self {
            provider,
            path,
            ttl,
        }
    }

    /// Location of the cache file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached models, or `None` if absent, invalid, or expired.
    pub fn get(&self) -> Option<Vec<ModelDescriptor>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(provider = %self.provider, path = %self.path.display(), error = %e, "failed to read discovery cache");
                return None;
            }
        };

        let record: CacheRecord = match serde_json::from_str(&content) {
            Ok(r) => r,
            Err(e) => {
                warn!(provider = %self.provider, path = %self.path.display(), error = %e, "corrupt discovery cache");
                return None;
            }
        };

        let age = unix_now() - record.timestamp;
        if !record.timestamp.is_finite() || age >= self.ttl.as_secs_f64() {
            debug!(provider = %self.provider, age_secs = age, "discovery cache expired");
            return None;
        }

        Some(record.models)
    }

    /// Persist `models` with the current timestamp. Failures are logged only.
    pub fn set(&self, models: &[ModelDescriptor]) {
        let record = CacheRecord {
            timestamp: unix_now(),
            models: models.to_vec(),
        };
        let json = match serde_json::to_vec_pretty(&record) {
            Ok(j) => j,
            Err(e) => {
                warn!(provider = %self.provider, error = %e, "failed to serialize discovery cache");
                return;
            }
        };
        match write_atomic(&self.path, &json) {
            Ok(()) => debug!(provider = %self.provider, count = models.len(), "discovery cache written"),
            Err(e) => {
                warn!(provider = %self.provider, path = %self.path.display(), error = %e, "failed to write discovery cache")
            }
        }
    }

    /// Remove the cache file. Clearing an absent file is a no-op.
    pub fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(provider = %self.provider, "discovery cache cleared"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(provider = %self.provider, path = %self.path.display(), error = %e, "failed to clear discovery cache")
            }
        }
    }
}

/// Keep provider tags from escaping the cache directory.
fn sanitize(provider: &str) -> String {
    provider
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
