//! In-process namespaced TTL cache.
//!
//! Keys are namespaced by convention: `"<namespace>:<rest>"`. Expiry is
//! lazy; expired entries report a miss and are evicted on read, with
//! `cleanup_expired` available for bulk sweeps.

mod prefetch;

pub use prefetch::{PrefetchItem, PrefetchRegistry};

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: u64,
    /// Fixed at insertion; refreshing a key replaces the entry.
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn new(value: Value, ttl_seconds: u64) -> Self {
        let now = Utc::now();
        Self {
            value,
            created_at: now,
            ttl_seconds,
            expires_at: now + ChronoDuration::seconds(ttl_seconds as i64),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    sets: u64,
    evictions: u64,
}

#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
    pub size: usize,
    pub hit_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct NamespaceInfo {
    pub namespace: String,
    pub entries: usize,
    pub expired: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_entry: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_entry: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct CacheEntryView {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ttl_seconds: u64,
    pub expired: bool,
}

pub struct TtlCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    counters: RwLock<Counters>,
    default_ttl_seconds: u64,
}

impl TtlCache {
    pub fn new(default_ttl_seconds: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            counters: RwLock::new(Counters::default()),
            default_ttl_seconds,
        }
    }

    pub fn default_ttl_seconds(&self) -> u64 {
        self.default_ttl_seconds
    }

    pub async fn set(&self, key: &str, value: Value, ttl_seconds: Option<u64>) {
        let ttl = ttl_seconds.unwrap_or(self.default_ttl_seconds);
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), CacheEntry::new(value, ttl));
        self.counters.write().await.sets += 1;
        debug!(key, ttl, "cache set");
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        let hit = {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
                Some(_) => None,
                None => {
                    self.counters.write().await.misses += 1;
                    return None;
                }
            }
        };
        match hit {
            Some(value) => {
                self.counters.write().await.hits += 1;
                Some(value)
            }
            None => {
                // Present but expired: evict on the way out.
                let mut entries = self.entries.write().await;
                if entries.get(key).map(|e| e.is_expired()).unwrap_or(false) {
                    entries.remove(key);
                    let mut counters = self.counters.write().await;
                    counters.misses += 1;
                    counters.evictions += 1;
                }
                None
            }
        }
    }

    /// Removes every key in the `"<namespace>:"` prefix; other namespaces,
    /// including ones sharing a textual prefix, are untouched.
    pub async fn clear_namespace(&self, namespace: &str) -> usize {
        let prefix = format!("{namespace}:");
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(&prefix));
        let removed = before - entries.len();
        debug!(namespace, removed, "cache namespace cleared");
        removed
    }

    pub async fn clear_all(&self) -> usize {
        let mut entries = self.entries.write().await;
        let removed = entries.len();
        entries.clear();
        removed
    }

    pub async fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        let removed = before - entries.len();
        if removed > 0 {
            self.counters.write().await.evictions += removed as u64;
        }
        removed
    }

    pub async fn stats(&self) -> CacheStats {
        let size = self.entries.read().await.len();
        let counters = self.counters.read().await;
        let lookups = counters.hits + counters.misses;
        CacheStats {
            hits: counters.hits,
            misses: counters.misses,
            sets: counters.sets,
            evictions: counters.evictions,
            size,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                counters.hits as f64 / lookups as f64
            },
        }
    }

    pub async fn get_entries(&self, include_expired: bool) -> Vec<CacheEntryView> {
        let entries = self.entries.read().await;
        let mut views: Vec<CacheEntryView> = entries
            .iter()
            .filter(|(_, entry)| include_expired || !entry.is_expired())
            .map(|(key, entry)| CacheEntryView {
                key: key.clone(),
                created_at: entry.created_at,
                expires_at: entry.expires_at,
                ttl_seconds: entry.ttl_seconds,
                expired: entry.is_expired(),
            })
            .collect();
        views.sort_by(|a, b| a.key.cmp(&b.key));
        views
    }

    pub async fn get_namespace_info(&self, namespace: &str) -> NamespaceInfo {
        let prefix = format!("{namespace}:");
        let entries = self.entries.read().await;
        let in_namespace: Vec<&CacheEntry> = entries
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, entry)| entry)
            .collect();
        NamespaceInfo {
            namespace: namespace.to_string(),
            entries: in_namespace.len(),
            expired: in_namespace.iter().filter(|e| e.is_expired()).count(),
            oldest_entry: in_namespace.iter().map(|e| e.created_at).min(),
            newest_entry: in_namespace.iter().map(|e| e.created_at).max(),
        }
    }

    pub async fn get_performance_metrics(&self) -> Value {
        let stats = self.stats().await;
        let entries = self.entries.read().await;
        let expired = entries.values().filter(|e| e.is_expired()).count();
        serde_json::json!({
            "hit_rate": stats.hit_rate,
            "lookups": stats.hits + stats.misses,
            "hits": stats.hits,
            "misses": stats.misses,
            "sets": stats.sets,
            "evictions": stats.evictions,
            "live_entries": entries.len() - expired,
            "expired_entries": expired,
            "default_ttl_seconds": self.default_ttl_seconds,
        })
    }
}
