//! Redis-backed broker and result store.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use tokio::sync::Mutex;
use tracing::{debug, info};

use opsboard_core::config::BrokerConfig;
use opsboard_core::errors::{OpsError, OpsResult};
use opsboard_core::keys;
use opsboard_core::traits::Broker;

// LLEN+DEL in one script so no producer can slip a message in between the
// count and the removal.
const DRAIN_SCRIPT: &str = r#"
local removed = redis.call('LLEN', KEYS[1])
redis.call('DEL', KEYS[1])
return removed
"#;

const SCAN_BATCH: usize = 500;

/// Production broker. Non-blocking commands go through one shared
/// `ConnectionManager`, which reconnects on its own; callers clone it per
/// operation instead of opening fresh connections. Blocking pops run on a
/// separate pool of dedicated connections, since BRPOP holds its connection
/// for the full server-side block and would stall every command pipelined
/// behind it on the manager.
pub struct RedisBroker {
    client: redis::Client,
    conn: ConnectionManager,
    blocking_pool: Mutex<Vec<MultiplexedConnection>>,
    key_prefix: String,
    ping_timeout: Duration,
    drain: redis::Script,
}

impl RedisBroker {
    pub async fn connect(config: &BrokerConfig) -> OpsResult<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| OpsError::config_error(format!("invalid broker url: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| OpsError::upstream(format!("broker connection failed: {e}")))?;
        info!(prefix = %config.key_prefix, "connected to redis broker");
        Ok(Self {
            client,
            conn,
            blocking_pool: Mutex::new(Vec::new()),
            key_prefix: config.key_prefix.clone(),
            ping_timeout: Duration::from_millis(config.ping_timeout_ms),
            drain: redis::Script::new(DRAIN_SCRIPT),
        })
    }

    /// One dedicated connection per in-flight blocking pop. Returned to the
    /// pool after a clean round trip, dropped on error so a broken socket
    /// is never reused.
    async fn checkout_blocking(&self) -> OpsResult<MultiplexedConnection> {
        if let Some(conn) = self.blocking_pool.lock().await.pop() {
            return Ok(conn);
        }
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(Self::upstream)
    }

    async fn return_blocking(&self, conn: MultiplexedConnection) {
        self.blocking_pool.lock().await.push(conn);
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    fn logical_key<'a>(&self, full: &'a str) -> &'a str {
        full.strip_prefix(&self.key_prefix)
            .and_then(|rest| rest.strip_prefix(':'))
            .unwrap_or(full)
    }

    fn upstream(err: redis::RedisError) -> OpsError {
        OpsError::upstream(format!("redis: {err}"))
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn ping(&self) -> OpsResult<()> {
        let mut conn = self.conn.clone();
        let cmd = redis::cmd("PING");
        let probe = cmd.query_async::<String>(&mut conn);
        match tokio::time::timeout(self.ping_timeout, probe).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(Self::upstream(e)),
            Err(_) => Err(OpsError::Timeout(format!(
                "broker ping exceeded {}ms",
                self.ping_timeout.as_millis()
            ))),
        }
    }

    async fn queue_len(&self, queue: &str) -> OpsResult<u64> {
        let mut conn = self.conn.clone();
        redis::cmd("LLEN")
            .arg(self.full_key(&keys::queue(queue)))
            .query_async(&mut conn)
            .await
            .map_err(Self::upstream)
    }

    async fn push(&self, queue: &str, payload: &[u8]) -> OpsResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("LPUSH")
            .arg(self.full_key(&keys::queue(queue)))
            .arg(payload)
            .query_async::<()>(&mut conn)
            .await
            .map_err(Self::upstream)
    }

    async fn pop(
        &self,
        queues: &[String],
        timeout: Duration,
    ) -> OpsResult<Option<(String, Vec<u8>)>> {
        let mut conn = self.checkout_blocking().await?;
        let mut cmd = redis::cmd("BRPOP");
        for queue in queues {
            cmd.arg(self.full_key(&keys::queue(queue)));
        }
        cmd.arg(timeout.as_secs_f64());
        let popped: Option<(String, Vec<u8>)> =
            cmd.query_async(&mut conn).await.map_err(Self::upstream)?;
        self.return_blocking(conn).await;
        Ok(popped.map(|(full_key, payload)| {
            let logical = self.logical_key(&full_key);
            let queue = logical.strip_prefix("queue:").unwrap_or(logical);
            (queue.to_string(), payload)
        }))
    }

    async fn drain_queue(&self, queue: &str) -> OpsResult<u64> {
        let mut conn = self.conn.clone();
        let removed: u64 = self
            .drain
            .key(self.full_key(&keys::queue(queue)))
            .invoke_async(&mut conn)
            .await
            .map_err(Self::upstream)?;
        debug!(queue, removed, "drained queue");
        Ok(removed)
    }

    async fn get(&self, key: &str) -> OpsResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(self.full_key(key))
            .query_async(&mut conn)
            .await
            .map_err(Self::upstream)
    }

    async fn set(&self, key: &str, value: &[u8]) -> OpsResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(self.full_key(key))
            .arg(value)
            .query_async::<()>(&mut conn)
            .await
            .map_err(Self::upstream)
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> OpsResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(self.full_key(key))
            .arg(value)
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async::<()>(&mut conn)
            .await
            .map_err(Self::upstream)
    }

    async fn delete(&self, keys: &[String]) -> OpsResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("DEL");
        for key in keys {
            cmd.arg(self.full_key(key));
        }
        cmd.query_async(&mut conn).await.map_err(Self::upstream)
    }

    async fn scan(&self, pattern: &str) -> OpsResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let full_pattern = self.full_key(pattern);
        let mut cursor: u64 = 0;
        let mut found = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&full_pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(Self::upstream)?;
            found.extend(batch.iter().map(|k| self.logical_key(k).to_string()));
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(found)
    }

    async fn exists(&self, key: &str) -> OpsResult<bool> {
        let mut conn = self.conn.clone();
        let count: u64 = redis::cmd("EXISTS")
            .arg(self.full_key(key))
            .query_async(&mut conn)
            .await
            .map_err(Self::upstream)?;
        Ok(count > 0)
    }

    async fn set_add(&self, set: &str, member: &str) -> OpsResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SADD")
            .arg(self.full_key(set))
            .arg(member)
            .query_async::<()>(&mut conn)
            .await
            .map_err(Self::upstream)
    }

    async fn set_contains(&self, set: &str, member: &str) -> OpsResult<bool> {
        let mut conn = self.conn.clone();
        let member_count: u64 = redis::cmd("SISMEMBER")
            .arg(self.full_key(set))
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(Self::upstream)?;
        Ok(member_count > 0)
    }

    async fn set_members(&self, set: &str) -> OpsResult<Vec<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("SMEMBERS")
            .arg(self.full_key(set))
            .query_async(&mut conn)
            .await
            .map_err(Self::upstream)
    }

    async fn set_remove(&self, set: &str, member: &str) -> OpsResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SREM")
            .arg(self.full_key(set))
            .arg(member)
            .query_async::<()>(&mut conn)
            .await
            .map_err(Self::upstream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> BrokerConfig {
        BrokerConfig {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string()),
            key_prefix: "opsboard-test".to_string(),
            ping_timeout_ms: 500,
            result_ttl_seconds: 60,
        }
    }

    #[tokio::test]
    #[ignore = "requires a running redis server"]
    async fn ping_stays_responsive_while_pop_blocks() {
        let broker = std::sync::Arc::new(RedisBroker::connect(&test_config()).await.unwrap());

        // Park a blocking pop on an empty queue, then probe through the
        // shared manager while it holds its dedicated connection.
        let popper = {
            let broker = broker.clone();
            tokio::spawn(async move {
                broker
                    .pop(&["idle".to_string()], Duration::from_secs(2))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = std::time::Instant::now();
        broker.ping().await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(400));

        assert!(popper.await.unwrap().unwrap().is_none());
    }
}
