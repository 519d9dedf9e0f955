//! Eviction policies for the embedding cache.
//!
//! Each policy picks exactly one victim from the index; the cache calls
//! [`select_victim()`] repeatedly until it is back within bounds.
//!
//! | Strategy | Victim                                                    |
//! |----------|-----------------------------------------------------------|
//! | LRU      | least recently touched (created, re-put, or read)         |
//! | LFU      | lowest access count, oldest insertion on ties             |
//! | FIFO     | oldest creation time, insertion order on ties             |
//! | TTL      | oldest expired entry; FIFO when nothing has expired       |

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::cache::CacheEntry;

/// Policy for choosing which entry to drop when the cache is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionStrategy {
    /// Least recently used.
    #[default]
    Lru,
    /// Least frequently used.
    Lfu,
    /// First in, first out.
    Fifo,
    /// Expired entries first, then FIFO. Also enables expiry on read.
    Ttl,
}

impl EvictionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionStrategy::Lru => "lru",
            EvictionStrategy::Lfu => "lfu",
            EvictionStrategy::Fifo => "fifo",
            EvictionStrategy::Ttl => "ttl",
        }
    }
}

impl fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvictionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionStrategy::Lru),
            "lfu" => Ok(EvictionStrategy::Lfu),
            "fifo" => Ok(EvictionStrategy::Fifo),
            "ttl" => Ok(EvictionStrategy::Ttl),
            other => Err(format!("unknown eviction strategy: {other}")),
        }
    }
}

/// Whether `entry` is older than `ttl` at unix time `now`.
pub(crate) fn is_expired(entry: &CacheEntry, now: f64, ttl: Duration) -> bool {
    now - entry.timestamp > ttl.as_secs_f64()
}

/// Key of the entry `strategy` would evict, or `None` if the index is empty.
pub(crate) fn select_victim(
    strategy: EvictionStrategy,
    entries: &BTreeMap<String, CacheEntry>,
    now: f64,
    ttl: Duration,
) -> Option<String> {
    let victim = match strategy {
        EvictionStrategy::Lru => entries.values().min_by_key(|e| e.recency),
        EvictionStrategy::Lfu => entries
            .values()
            .min_by_key(|e| (e.access_count, e.sequence)),
        EvictionStrategy::Fifo => oldest(entries.values()),
        EvictionStrategy::Ttl => {
            oldest(entries.values().filter(|e| is_expired(e, now, ttl)))
                .or_else(|| oldest(entries.values()))
        }
    };
    victim.map(|e| e.key.clone())
}

fn oldest<'a>(entries: impl Iterator<Item = &'a CacheEntry>) -> Option<&'a CacheEntry> {
    entries.min_by(|a, b| {
        a.timestamp
            .total_cmp(&b.timestamp)
            .then(a.sequence.cmp(&b.sequence))
    })
}
