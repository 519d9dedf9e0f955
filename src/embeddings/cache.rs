//! Disk-backed, content-addressed embedding cache.
//!
//! # Layout
//!
//! ```text
//! <dir>/
//! ├── index.json           key → CacheEntry (written via temp file + rename)
//! ├── 3f/
//! │   └── 3fa1…c9.bin      little-endian f32 components
//! └── …
//! ```
//!
//! The key is the hex SHA-256 of `model`, a NUL byte, and `text`, so one
//! text embedded by two models gets two entries.
//!
//! # Integrity
//!
//! - an unreadable or corrupt index loads as empty (logged, never raised)
//! - an entry whose blob is missing or malformed is dropped on read
//! - file-removal failures are logged; the index entry is removed anyway
//!
//! The cache assumes a single writer process. Within a process, share one
//! instance (the pipeline keeps it behind a mutex).

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::eviction::{EvictionStrategy, is_expired, select_victim};
use crate::cache::{unix_now, write_atomic};
use crate::telemetry;

/// Default maximum number of cached embeddings.
pub const DEFAULT_MAX_SIZE: usize = 10_000;

/// Default entry lifetime under [`EvictionStrategy::Ttl`]: 7 days.
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

const INDEX_FILE: &str = "index.json";
const SECS_PER_DAY: f64 = 86_400.0;

/// Default cache directory: `~/.cache/huginn/embeddings`.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("huginn")
        .join("embeddings")
}

/// Embedding cache settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EmbeddingCacheConfig {
    pub dir: PathBuf,
    pub max_size: usize,
    pub strategy: EvictionStrategy,
    #[serde(rename = "ttl_secs", deserialize_with = "secs")]
    pub ttl: Duration,
}

impl Default for EmbeddingCacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            max_size: DEFAULT_MAX_SIZE,
            strategy: EvictionStrategy::default(),
            ttl: DEFAULT_TTL,
        }
    }
}

impl EmbeddingCacheConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn strategy(mut self, strategy: EvictionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

fn secs<'de, D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Duration, D::Error> {
    u64::deserialize(d).map(Duration::from_secs)
}

/// Index record for one cached embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub model: String,
    /// Creation (or last re-put) time, unix seconds.
    pub timestamp: f64,
    pub access_count: u64,
    /// Last read time, unix seconds; `None` until first read.
    #[serde(default)]
    pub last_access: Option<f64>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    /// Logical insertion order; breaks FIFO and LFU ties.
    #[serde(default)]
    pub sequence: u64,
    /// Logical order of the last put or read; drives LRU.
    #[serde(default)]
    pub recency: u64,
}

/// Snapshot of cache contents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub total_mb: f64,
    /// Distinct model names, sorted.
    pub models: Vec<String>,
    pub strategy: EvictionStrategy,
    pub max_size: usize,
    /// Age of the oldest entry in days; `None` when empty.
    pub oldest_entry_days: Option<f64>,
    /// Age of the newest entry in days; `None` when empty.
    pub newest_entry_days: Option<f64>,
}

/// Content hash identifying a (text, model) pair.
pub fn cache_key(text: &str, model: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Disk-backed embedding store with bounded size.
#[derive(Debug)]
pub struct EmbeddingCache {
    config: EmbeddingCacheConfig,
    index: BTreeMap<String, CacheEntry>,
    next_tick: u64,
}

impl EmbeddingCache {
    /// Open (or create) the cache in `config.dir`.
    ///
    /// Fails only if the directory cannot be created.
    pub fn open(config: EmbeddingCacheConfig) -> io::Result<Self> {
        std::fs::create_dir_all(&config.dir)?;
        let index = load_index(&config.dir.join(INDEX_FILE));
        let next_tick = index
            .values()
            .map(|e| e.sequence.max(e.recency) + 1)
            .max()
            .unwrap_or(0);
        debug!(dir = %config.dir.display(), entries = index.len(), strategy = %config.strategy, "embedding cache opened");
        Ok(Self {
            config,
            index,
            next_tick,
        })
    }

    pub fn config(&self) -> &EmbeddingCacheConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Whether an entry exists for (text, model). Does not touch access
    /// bookkeeping or verify the blob.
    pub fn contains(&self, text: &str, model: &str) -> bool {
        self.index.contains_key(&cache_key(text, model))
    }

    /// Index record for (text, model), if cached.
    pub fn entry(&self, text: &str, model: &str) -> Option<&CacheEntry> {
        self.index.get(&cache_key(text, model))
    }

    /// Store `embedding` for (text, model), then evict down to `max_size`.
    ///
    /// Re-putting an existing key overwrites the vector, replaces the
    /// metadata, and refreshes the timestamp; access counts carry over.
    pub fn put(
        &mut self,
        text: &str,
        model: &str,
        embedding: &[f32],
        metadata: Option<serde_json::Value>,
    ) -> io::Result<()> {
        let key = cache_key(text, model);
        write_atomic(&self.blob_path(&key), &encode(embedding))?;

        let now = unix_now();
        let tick = self.tick();
        match self.index.get_mut(&key) {
            Some(entry) => {
                entry.timestamp = now;
                entry.metadata = metadata;
                entry.model = model.to_string();
                entry.sequence = tick;
                entry.recency = tick;
            }
            None => {
                self.index.insert(
                    key.clone(),
                    CacheEntry {
                        key,
                        model: model.to_string(),
                        timestamp: now,
                        access_count: 1,
                        last_access: None,
                        metadata,
                        sequence: tick,
                        recency: tick,
                    },
                );
            }
        }

        self.evict_overflow(now);
        self.persist();
        Ok(())
    }

    /// Cached vector for (text, model), updating access bookkeeping.
    ///
    /// Expired entries (TTL strategy only) and entries with an unreadable
    /// blob are removed and reported as misses.
    pub fn get(&mut self, text: &str, model: &str) -> Option<Vec<f32>> {
        let key = cache_key(text, model);
        let now = unix_now();

        let Some(entry) = self.index.get(&key) else {
            self.record_lookup(model, false);
            return None;
        };

        if self.config.strategy == EvictionStrategy::Ttl && is_expired(entry, now, self.config.ttl)
        {
            debug!(model, key = %key, "cache entry expired");
            self.remove_entry(&key);
            self.persist();
            self.record_lookup(model, false);
            return None;
        }

        let vector = match std::fs::read(self.blob_path(&key)) {
            Ok(bytes) => decode(&bytes),
            Err(e) => {
                warn!(model, key = %key, error = %e, "cache blob unreadable, dropping entry");
                None
            }
        };
        let Some(vector) = vector else {
            warn!(model, key = %key, "cache blob missing or malformed, dropping entry");
            self.remove_entry(&key);
            self.persist();
            self.record_lookup(model, false);
            return None;
        };

        let tick = self.tick();
        if let Some(entry) = self.index.get_mut(&key) {
            entry.access_count += 1;
            entry.last_access = Some(now);
            entry.recency = tick;
        }
        self.persist();
        self.record_lookup(model, true);
        Some(vector)
    }

    /// Remove the entry for (text, model). Returns whether one existed.
    pub fn invalidate(&mut self, text: &str, model: &str) -> bool {
        let key = cache_key(text, model);
        if !self.index.contains_key(&key) {
            return false;
        }
        self.remove_entry(&key);
        self.persist();
        true
    }

    /// Remove every entry for `model`. Returns how many were removed.
    pub fn invalidate_model(&mut self, model: &str) -> usize {
        let keys: Vec<String> = self
            .index
            .values()
            .filter(|e| e.model == model)
            .map(|e| e.key.clone())
            .collect();
        self.remove_all(&keys)
    }

    /// Remove entries created more than `max_age_days` ago, regardless of
    /// strategy. Returns how many were removed.
    pub fn cleanup_old(&mut self, max_age_days: u64) -> usize {
        let cutoff = unix_now() - max_age_days as f64 * SECS_PER_DAY;
        let keys: Vec<String> = self
            .index
            .values()
            .filter(|e| e.timestamp < cutoff)
            .map(|e| e.key.clone())
            .collect();
        let removed = self.remove_all(&keys);
        if removed > 0 {
            debug!(removed, max_age_days, "removed old cache entries");
        }
        removed
    }

    /// Remove everything. Returns how many index entries were dropped.
    pub fn clear(&mut self) -> usize {
        let keys: Vec<String> = self.index.keys().cloned().collect();
        self.remove_all(&keys)
    }

    /// Summary of current contents.
    pub fn get_stats(&self) -> CacheStats {
        let now = unix_now();
        let total_bytes: u64 = self
            .index
            .keys()
            .filter_map(|key| std::fs::metadata(self.blob_path(key)).ok())
            .map(|m| m.len())
            .sum();
        let models: BTreeSet<&str> = self.index.values().map(|e| e.model.as_str()).collect();
        let oldest = self
            .index
            .values()
            .map(|e| e.timestamp)
            .min_by(f64::total_cmp);
        let newest = self
            .index
            .values()
            .map(|e| e.timestamp)
            .max_by(f64::total_cmp);

        CacheStats {
            entries: self.index.len(),
            total_bytes,
            total_mb: total_bytes as f64 / (1024.0 * 1024.0),
            models: models.into_iter().map(str::to_string).collect(),
            strategy: self.config.strategy,
            max_size: self.config.max_size,
            oldest_entry_days: oldest.map(|t| (now - t) / SECS_PER_DAY),
            newest_entry_days: newest.map(|t| (now - t) / SECS_PER_DAY),
        }
    }

    fn tick(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        let shard = key.get(..2).unwrap_or("00");
        self.config.dir.join(shard).join(format!("{key}.bin"))
    }

    fn evict_overflow(&mut self, now: f64) {
        while self.index.len() > self.config.max_size {
            let Some(victim) =
                select_victim(self.config.strategy, &self.index, now, self.config.ttl)
            else {
                break;
            };
            debug!(key = %victim, strategy = %self.config.strategy, "evicting cache entry");
            self.remove_entry(&victim);
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL,
                "strategy" => self.config.strategy.as_str(),
            )
            .increment(1);
        }
    }

    fn remove_all(&mut self, keys: &[String]) -> usize {
        for key in keys {
            self.remove_entry(key);
        }
        if !keys.is_empty() {
            self.persist();
        }
        keys.len()
    }

    /// Drop the index entry and its blob. Blob failures are logged only.
    fn remove_entry(&mut self, key: &str) {
        self.index.remove(key);
        match std::fs::remove_file(self.blob_path(key)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(key, error = %e, "failed to remove cache blob"),
        }
    }

    fn persist(&self) {
        let path = self.config.dir.join(INDEX_FILE);
        let json = match serde_json::to_vec(&self.index) {
            Ok(j) => j,
            Err(e) => {
                warn!(error = %e, "failed to serialize cache index");
                return;
            }
        };
        if let Err(e) = write_atomic(&path, &json) {
            warn!(path = %path.display(), error = %e, "failed to write cache index");
        }
    }

    fn record_lookup(&self, model: &str, hit: bool) {
        let name = if hit {
            telemetry::CACHE_HITS_TOTAL
        } else {
            telemetry::CACHE_MISSES_TOTAL
        };
        metrics::counter!(name, "model" => model.to_owned()).increment(1);
    }
}

fn load_index(path: &Path) -> BTreeMap<String, CacheEntry> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read cache index, starting empty");
            return BTreeMap::new();
        }
    };
    match serde_json::from_str(&content) {
        Ok(index) => index,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt cache index, starting empty");
            BTreeMap::new()
        }
    }
}

fn encode(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_depends_on_model_and_text() {
        let a = cache_key("hello", "m1");
        assert_eq!(a.len(), 64);
        assert_eq!(a, cache_key("hello", "m1"));
        assert_ne!(a, cache_key("hello", "m2"));
        assert_ne!(cache_key("ab", "c"), cache_key("b", "ca"));
    }

    #[test]
    fn blob_encoding() {
        let values = vec![0.25f32, -1.0, f32::MAX];
        assert_eq!(decode(&encode(&values)).unwrap(), values);
        assert_eq!(decode(&[]).unwrap(), Vec::<f32>::new());
        assert!(decode(&[0, 0, 0]).is_none());
    }

    #[test]
    fn blob_path_is_sharded() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EmbeddingCache::open(EmbeddingCacheConfig::new(dir.path())).unwrap();
        let key = cache_key("x", "m");
        let path = cache.blob_path(&key);
        assert_eq!(path.parent().unwrap(), dir.path().join(&key[..2]));
    }

    #[test]
    fn new_entry_bookkeeping() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = EmbeddingCache::open(EmbeddingCacheConfig::new(dir.path())).unwrap();
        cache
            .put("t", "m", &[1.0, 2.0], Some(serde_json::json!({"src": "doc"})))
            .unwrap();

        let entry = cache.entry("t", "m").unwrap();
        assert_eq!(entry.access_count, 1);
        assert!(entry.last_access.is_none());
        assert_eq!(entry.metadata.as_ref().unwrap()["src"], "doc");

        cache.get("t", "m").unwrap();
        let entry = cache.entry("t", "m").unwrap();
        assert_eq!(entry.access_count, 2);
        assert!(entry.last_access.is_some());
    }

    #[test]
    fn reput_keeps_access_count_and_replaces_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = EmbeddingCache::open(EmbeddingCacheConfig::new(dir.path())).unwrap();
        cache
            .put("t", "m", &[1.0], Some(serde_json::json!({"v": 1})))
            .unwrap();
        cache.get("t", "m");
        cache.put("t", "m", &[2.0], None).unwrap();

        let entry = cache.entry("t", "m").unwrap();
        assert_eq!(entry.access_count, 2);
        assert!(entry.metadata.is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("t", "m").unwrap(), vec![2.0]);
    }

    #[test]
    fn ticks_resume_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = EmbeddingCacheConfig::new(dir.path());
        {
            let mut cache = EmbeddingCache::open(config.clone()).unwrap();
            cache.put("a", "m", &[1.0], None).unwrap();
            cache.put("b", "m", &[1.0], None).unwrap();
        }
        let mut cache = EmbeddingCache::open(config).unwrap();
        cache.put("c", "m", &[1.0], None).unwrap();
        let b = cache.entry("b", "m").unwrap().sequence;
        let c = cache.entry("c", "m").unwrap().sequence;
        assert!(c > b);
    }
}
