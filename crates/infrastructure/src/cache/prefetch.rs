//! Startup cache warming.
//!
//! Producers run fire-and-forget: a slow or failing producer logs a warning
//! and leaves its key cold, and the normal miss path stays correct. Warming
//! races with early requests on purpose.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{info, warn};

use super::TtlCache;

type Producer = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

pub struct PrefetchItem {
    pub name: String,
    /// Deterministic cache key the produced value lands under.
    pub key: String,
    pub ttl_seconds: Option<u64>,
    pub enabled: bool,
    producer: Producer,
}

#[derive(Default)]
pub struct PrefetchRegistry {
    items: Vec<PrefetchItem>,
}

impl PrefetchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        key: impl Into<String>,
        ttl_seconds: Option<u64>,
        producer: F,
    ) where
        F: Fn() -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync + 'static,
    {
        self.items.push(PrefetchItem {
            name: name.into(),
            key: key.into(),
            ttl_seconds,
            enabled: true,
            producer: Arc::new(producer),
        });
    }

    pub fn disable(&mut self, name: &str) {
        for item in &mut self.items {
            if item.name == name {
                item.enabled = false;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Spawns every enabled producer. Returns immediately; completion is
    /// observable only through the cache itself.
    pub fn warm(&self, cache: Arc<TtlCache>) {
        for item in self.items.iter().filter(|i| i.enabled) {
            let name = item.name.clone();
            let key = item.key.clone();
            let ttl = item.ttl_seconds;
            let producer = item.producer.clone();
            let cache = cache.clone();
            tokio::spawn(async move {
                match producer().await {
                    Ok(value) => {
                        cache.set(&key, value, ttl).await;
                        info!(item = %name, key = %key, "cache prefetched");
                    }
                    Err(e) => {
                        warn!(item = %name, error = %e, "cache prefetch failed");
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn warm_populates_enabled_items() {
        let cache = Arc::new(TtlCache::new(600));
        let mut registry = PrefetchRegistry::new();
        registry.register("queues", "queues:list", Some(60), || {
            Box::pin(async { Ok(json!(["default", "backup"])) })
        });
        registry.register("broken", "broken:item", None, || {
            Box::pin(async { anyhow::bail!("upstream offline") })
        });
        registry.register("skipped", "skipped:item", None, || {
            Box::pin(async { Ok(json!(1)) })
        });
        registry.disable("skipped");

        registry.warm(cache.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            cache.get("queues:list").await,
            Some(json!(["default", "backup"]))
        );
        assert_eq!(cache.get("broken:item").await, None);
        assert_eq!(cache.get("skipped:item").await, None);
    }
}
