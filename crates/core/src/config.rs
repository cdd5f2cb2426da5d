//! Runtime configuration.
//!
//! Configuration is loaded from a TOML file with `OPSBOARD_`-prefixed
//! environment overrides layered on top, then validated once at startup.
//! Every section has serde defaults so a partial file (or none at all, for
//! the embedded mode) still produces a usable config.

use serde::{Deserialize, Serialize};

use crate::errors::{OpsError, OpsResult};
use crate::models::QueueDefinition;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Relational store for templates/schedules/runs. Absent in embedded
    /// mode, where in-memory repositories are used instead.
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub beat: BeatConfig,
    /// Initial queue roster seeded into the broker on first startup.
    #[serde(default = "QueueDefinition::built_in_set")]
    pub queues: Vec<QueueDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub url: String,
    /// Prefix applied to every broker key owned by this deployment.
    pub key_prefix: String,
    /// Bound on connectivity probes; a probe that exceeds it reports the
    /// broker as down rather than hanging the requesting call.
    pub ping_timeout_ms: u64,
    /// TTL on task result records; expired results age out on their own.
    pub result_ttl_seconds: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            key_prefix: "opsboard".to_string(),
            ping_timeout_ms: 2_000,
            result_ttl_seconds: 86_400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub prefetch_multiplier: u32,
    pub heartbeat_interval_seconds: u64,
    /// Heartbeat snapshots expire after this; dead workers age out of the
    /// control plane instead of lingering forever.
    pub heartbeat_ttl_seconds: u64,
    pub task_time_limit_seconds: u64,
    pub queues: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            prefetch_multiplier: 1,
            heartbeat_interval_seconds: 15,
            heartbeat_ttl_seconds: 60,
            task_time_limit_seconds: 3_600,
            queues: vec![
                "default".to_string(),
                "backup".to_string(),
                "network".to_string(),
                "heavy".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    pub enabled: bool,
    pub interval_hours: u64,
    /// Result/log records older than this are removed by the cleanup task.
    pub age_hours: i64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_hours: 6,
            age_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub default_ttl_seconds: u64,
    pub prefetch_on_startup: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_seconds: 600,
            prefetch_on_startup: true,
        }
    }
}

/// One entry in the periodic-schedule table. The table is static
/// configuration; the external beat process fires these, the control plane
/// only lists them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatEntry {
    pub name: String,
    pub task: String,
    /// Human-readable cadence, e.g. "every 6 hours" or a cron expression.
    pub schedule: String,
    #[serde(default)]
    pub queue: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatConfig {
    pub scheduler: String,
    #[serde(default)]
    pub entries: Vec<BeatEntry>,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            scheduler: "redbeat".to_string(),
            entries: vec![BeatEntry {
                name: "periodic-cleanup".to_string(),
                task: "system.cleanup".to_string(),
                schedule: "every 6 hours".to_string(),
                queue: Some("default".to_string()),
            }],
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: None,
            broker: BrokerConfig::default(),
            worker: WorkerConfig::default(),
            cleanup: CleanupConfig::default(),
            cache: CacheConfig::default(),
            beat: BeatConfig::default(),
            queues: QueueDefinition::built_in_set(),
        }
    }
}

impl AppConfig {
    /// Load from a TOML file (optional) with environment overrides, e.g.
    /// `OPSBOARD_BROKER__URL=redis://prod:6379`.
    pub fn load(path: &str) -> OpsResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("OPSBOARD").separator("__"))
            .build()
            .map_err(|e| OpsError::config_error(format!("failed to read config: {e}")))?;

        let cfg: AppConfig = settings
            .try_deserialize()
            .map_err(|e| OpsError::config_error(format!("invalid config: {e}")))?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> OpsResult<()> {
        if self.server.port == 0 {
            return Err(OpsError::config_error("server.port must be non-zero"));
        }
        if self.worker.concurrency == 0 {
            return Err(OpsError::config_error("worker.concurrency must be >= 1"));
        }
        if self.worker.queues.is_empty() {
            return Err(OpsError::config_error(
                "worker.queues must list at least one queue",
            ));
        }
        if self.cleanup.age_hours < 1 {
            return Err(OpsError::config_error("cleanup.age_hours must be >= 1"));
        }
        let names: Vec<&str> = self.queues.iter().map(|q| q.name.as_str()).collect();
        let missing = QueueDefinition::missing_built_ins(&names);
        if !missing.is_empty() {
            return Err(OpsError::config_error(format!(
                "queue roster is missing built-in queues: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    pub fn embedded(&self) -> bool {
        self.database.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert!(cfg.embedded());
        assert_eq!(cfg.queues.len(), 4);
    }

    #[test]
    fn load_from_toml_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
[server]
host = "0.0.0.0"
port = 9000

[broker]
url = "redis://broker:6379/1"
key_prefix = "ops"
ping_timeout_ms = 500
result_ttl_seconds = 3600

[cleanup]
enabled = true
interval_hours = 12
age_hours = 48
"#
        )
        .unwrap();

        let cfg = AppConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.broker.key_prefix, "ops");
        assert_eq!(cfg.cleanup.age_hours, 48);
        // untouched sections keep their defaults
        assert_eq!(cfg.worker.concurrency, 4);
    }

    #[test]
    fn validate_rejects_missing_built_in_queue() {
        let mut cfg = AppConfig::default();
        cfg.queues.retain(|q| q.name != "backup");
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("backup"));
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut cfg = AppConfig::default();
        cfg.worker.concurrency = 0;
        assert!(cfg.validate().is_err());
    }
}
