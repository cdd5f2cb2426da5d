//! Control plane over the queue fabric: worker fleet inspection, queue
//! stats, purges, the periodic schedule table, beat status, and the shared
//! queue settings document.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use opsboard_core::config::AppConfig;
use opsboard_core::errors::{OpsError, OpsResult};
use opsboard_core::keys;
use opsboard_core::models::{ActiveTask, QueueDefinition, QueueSettings, WorkerSnapshot};
use opsboard_core::traits::Broker;

/// Fleet overview keyed by worker id, shaped like the inspect payloads the
/// dashboard already consumes.
#[derive(Debug, Serialize)]
pub struct WorkersOverview {
    pub active_tasks: BTreeMap<String, Vec<ActiveTask>>,
    pub stats: BTreeMap<String, Value>,
    pub registered_tasks: BTreeMap<String, Vec<String>>,
    pub active_queues: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct QueueInfo {
    pub name: String,
    pub description: String,
    pub built_in: bool,
    pub pending_tasks: u64,
    pub active_tasks: usize,
    pub workers: Vec<String>,
    pub worker_count: usize,
    pub exchange: String,
    pub routing_key: String,
}

#[derive(Debug, Serialize)]
pub struct PurgeOutcome {
    pub queue: String,
    pub purged: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PurgeReport {
    pub queues: Vec<PurgeOutcome>,
    pub total_purged: u64,
}

#[derive(Debug, Serialize)]
pub struct ScheduleInfo {
    pub name: String,
    pub task: String,
    pub schedule: String,
    pub options: Value,
}

#[derive(Debug, Serialize)]
pub struct BeatStatus {
    pub beat_running: bool,
    pub message: String,
}

/// Coarse health summary. Never fails: a down broker reports
/// `redis_connected: false` instead of an error.
#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub redis_connected: bool,
    pub worker_count: usize,
    pub active_tasks: usize,
    pub beat_running: bool,
}

#[derive(Debug, Serialize)]
pub struct ConfigSnapshot {
    pub broker: BrokerSnapshot,
    pub worker: WorkerSettingsSnapshot,
    pub task: TaskSettingsSnapshot,
    pub result: ResultSettingsSnapshot,
    pub beat: BeatSnapshot,
    pub timezone: String,
    pub enable_utc: bool,
}

#[derive(Debug, Serialize)]
pub struct BrokerSnapshot {
    pub host: String,
    pub port: u16,
    /// Whether the broker URL carries a credential. The credential itself
    /// is never exposed.
    pub has_password: bool,
}

#[derive(Debug, Serialize)]
pub struct WorkerSettingsSnapshot {
    pub concurrency: usize,
    pub prefetch_multiplier: u32,
}

#[derive(Debug, Serialize)]
pub struct TaskSettingsSnapshot {
    pub serializer: String,
    pub time_limit_seconds: u64,
    pub track_started: bool,
}

#[derive(Debug, Serialize)]
pub struct ResultSettingsSnapshot {
    pub expires_seconds: u64,
    pub serializer: String,
}

#[derive(Debug, Serialize)]
pub struct BeatSnapshot {
    pub scheduler: String,
    pub schedule_count: usize,
}

/// Partial update to the shared queue settings document. Absent fields keep
/// their current values.
#[derive(Debug, Default, Deserialize)]
pub struct QueueSettingsUpdate {
    pub max_workers: Option<usize>,
    pub cleanup_enabled: Option<bool>,
    pub cleanup_interval_hours: Option<u64>,
    pub cleanup_age_hours: Option<i64>,
    pub queues: Option<Vec<QueueDefinition>>,
}

pub struct QueueControlService {
    broker: Arc<dyn Broker>,
    config: AppConfig,
}

impl QueueControlService {
    pub fn new(broker: Arc<dyn Broker>, config: AppConfig) -> Self {
        Self { broker, config }
    }

    fn default_settings(&self) -> QueueSettings {
        QueueSettings {
            queues: self.config.queues.clone(),
            max_workers: self.config.worker.concurrency,
            cleanup_enabled: self.config.cleanup.enabled,
            cleanup_interval_hours: self.config.cleanup.interval_hours,
            cleanup_age_hours: self.config.cleanup.age_hours,
        }
    }

    async fn worker_snapshots(&self) -> OpsResult<Vec<WorkerSnapshot>> {
        let keys = self.broker.scan(keys::WORKER_PATTERN).await?;
        let mut snapshots = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(raw) = self.broker.get(&key).await? else {
                continue; // expired between scan and get
            };
            match serde_json::from_slice::<WorkerSnapshot>(&raw) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => warn!(key, error = %e, "skipping unreadable worker snapshot"),
            }
        }
        Ok(snapshots)
    }

    pub async fn list_workers(&self) -> OpsResult<WorkersOverview> {
        let snapshots = self.worker_snapshots().await?;
        let mut overview = WorkersOverview {
            active_tasks: BTreeMap::new(),
            stats: BTreeMap::new(),
            registered_tasks: BTreeMap::new(),
            active_queues: BTreeMap::new(),
        };
        for snapshot in snapshots {
            overview.stats.insert(
                snapshot.id.clone(),
                json!({
                    "hostname": snapshot.hostname,
                    "pid": snapshot.pid,
                    "started_at": snapshot.started_at,
                    "heartbeat_at": snapshot.heartbeat_at,
                    "processed": snapshot.processed,
                    "failed": snapshot.failed,
                }),
            );
            overview
                .registered_tasks
                .insert(snapshot.id.clone(), snapshot.registered_job_types);
            overview
                .active_queues
                .insert(snapshot.id.clone(), snapshot.queues);
            overview
                .active_tasks
                .insert(snapshot.id, snapshot.active);
        }
        Ok(overview)
    }

    pub async fn list_queues(&self) -> OpsResult<Vec<QueueInfo>> {
        let settings = self.get_settings().await?;
        let snapshots = self.worker_snapshots().await?;
        let mut queues = Vec::with_capacity(settings.queues.len());
        for definition in &settings.queues {
            let pending = self.broker.queue_len(&definition.name).await?;
            let consumers: Vec<&WorkerSnapshot> = snapshots
                .iter()
                .filter(|s| s.queues.contains(&definition.name))
                .collect();
            let active = consumers
                .iter()
                .flat_map(|s| s.active.iter())
                .filter(|t| t.queue == definition.name)
                .count();
            queues.push(QueueInfo {
                name: definition.name.clone(),
                description: definition.description.clone(),
                built_in: definition.built_in,
                pending_tasks: pending,
                active_tasks: active,
                workers: consumers.iter().map(|s| s.id.clone()).collect(),
                worker_count: consumers.len(),
                exchange: definition.exchange().to_string(),
                routing_key: definition.routing_key().to_string(),
            });
        }
        Ok(queues)
    }

    pub async fn purge_queue(&self, name: &str) -> OpsResult<u64> {
        let settings = self.get_settings().await?;
        if !settings.queues.iter().any(|q| q.name == name) {
            return Err(OpsError::not_found(format!("queue '{name}'")));
        }
        let purged = self.broker.drain_queue(name).await?;
        info!(queue = name, purged, "queue purged");
        Ok(purged)
    }

    /// Purges every configured queue. Failures are recorded per queue and
    /// never abort the remaining purges.
    pub async fn purge_all_queues(&self) -> OpsResult<PurgeReport> {
        let settings = self.get_settings().await?;
        let mut outcomes = Vec::with_capacity(settings.queues.len());
        let mut total = 0;
        for definition in &settings.queues {
            match self.broker.drain_queue(&definition.name).await {
                Ok(purged) => {
                    total += purged;
                    outcomes.push(PurgeOutcome {
                        queue: definition.name.clone(),
                        purged,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(queue = %definition.name, error = %e, "purge failed");
                    outcomes.push(PurgeOutcome {
                        queue: definition.name.clone(),
                        purged: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        info!(total, "purge-all completed");
        Ok(PurgeReport {
            queues: outcomes,
            total_purged: total,
        })
    }

    /// Periodic schedule table. Static configuration; the beat process
    /// fires these, this surface only reports them.
    pub fn list_schedules(&self) -> Vec<ScheduleInfo> {
        self.config
            .beat
            .entries
            .iter()
            .map(|entry| ScheduleInfo {
                name: entry.name.clone(),
                task: entry.task.clone(),
                schedule: entry.schedule.clone(),
                options: json!({ "queue": entry.queue }),
            })
            .collect()
    }

    /// Presence heuristic, not a liveness probe: the beat scheduler holds a
    /// lock key and persists schedule state. Either key existing counts as
    /// running, with a known false-positive window after a crash until the
    /// key expires.
    pub async fn beat_status(&self) -> OpsResult<BeatStatus> {
        let running = self.broker.exists(keys::BEAT_LOCK).await?
            || self.broker.exists(keys::BEAT_SCHEDULE).await?;
        let message = if running {
            "Beat scheduler appears to be running".to_string()
        } else {
            "No beat scheduler detected".to_string()
        };
        Ok(BeatStatus {
            beat_running: running,
            message,
        })
    }

    /// Coarse health summary that never errors: every probe fails closed.
    pub async fn overall_status(&self) -> SystemStatus {
        let redis_connected = self.broker.ping().await.is_ok();
        let snapshots = self.worker_snapshots().await.unwrap_or_default();
        let active_tasks = snapshots.iter().map(|s| s.active.len()).sum();
        let beat_running = self
            .beat_status()
            .await
            .map(|s| s.beat_running)
            .unwrap_or(false);
        SystemStatus {
            redis_connected,
            worker_count: snapshots.len(),
            active_tasks,
            beat_running,
        }
    }

    /// Effective runtime configuration, with credentials reduced to a
    /// boolean.
    pub fn config_snapshot(&self) -> OpsResult<ConfigSnapshot> {
        let url = url::Url::parse(&self.config.broker.url)
            .map_err(|e| OpsError::config_error(format!("invalid broker url: {e}")))?;
        Ok(ConfigSnapshot {
            broker: BrokerSnapshot {
                host: url.host_str().unwrap_or("localhost").to_string(),
                port: url.port().unwrap_or(6379),
                has_password: url.password().is_some(),
            },
            worker: WorkerSettingsSnapshot {
                concurrency: self.config.worker.concurrency,
                prefetch_multiplier: self.config.worker.prefetch_multiplier,
            },
            task: TaskSettingsSnapshot {
                serializer: "json".to_string(),
                time_limit_seconds: self.config.worker.task_time_limit_seconds,
                track_started: true,
            },
            result: ResultSettingsSnapshot {
                expires_seconds: self.config.broker.result_ttl_seconds,
                serializer: "json".to_string(),
            },
            beat: BeatSnapshot {
                scheduler: self.config.beat.scheduler.clone(),
                schedule_count: self.config.beat.entries.len(),
            },
            timezone: "UTC".to_string(),
            enable_utc: true,
        })
    }

    pub async fn get_settings(&self) -> OpsResult<QueueSettings> {
        match self.broker.get(keys::QUEUE_SETTINGS).await? {
            Some(raw) => Ok(serde_json::from_slice(&raw)?),
            None => Ok(self.default_settings()),
        }
    }

    pub async fn update_settings(&self, update: QueueSettingsUpdate) -> OpsResult<QueueSettings> {
        let mut settings = self.get_settings().await?;
        if let Some(mut queues) = update.queues {
            let names: Vec<&str> = queues.iter().map(|q| q.name.as_str()).collect();
            let missing = QueueDefinition::missing_built_ins(&names);
            if !missing.is_empty() {
                return Err(OpsError::validation(format!(
                    "cannot remove built-in queues: {}",
                    missing.join(", ")
                )));
            }
            for queue in &mut queues {
                queue.built_in = opsboard_core::models::BUILT_IN_QUEUES
                    .contains(&queue.name.as_str());
            }
            settings.queues = queues;
        }
        if let Some(max_workers) = update.max_workers {
            if max_workers == 0 {
                return Err(OpsError::validation("max_workers must be >= 1"));
            }
            settings.max_workers = max_workers;
        }
        if let Some(enabled) = update.cleanup_enabled {
            settings.cleanup_enabled = enabled;
        }
        if let Some(interval) = update.cleanup_interval_hours {
            settings.cleanup_interval_hours = interval;
        }
        if let Some(age) = update.cleanup_age_hours {
            if age < 1 {
                return Err(OpsError::validation("cleanup_age_hours must be >= 1"));
            }
            settings.cleanup_age_hours = age;
        }
        self.write_settings(&settings).await?;
        info!(queues = settings.queues.len(), "queue settings updated");
        Ok(settings)
    }

    /// Startup seed: writes the default roster when none exists and adds
    /// back any built-in queue a stale document is missing.
    pub async fn ensure_builtin_queues(&self) -> OpsResult<()> {
        let mut settings = self.get_settings().await?;
        let names: Vec<&str> = settings.queues.iter().map(|q| q.name.as_str()).collect();
        let missing = QueueDefinition::missing_built_ins(&names);
        if !missing.is_empty() {
            warn!(missing = ?missing, "restoring missing built-in queues");
            for definition in QueueDefinition::built_in_set() {
                if missing.contains(&definition.name) {
                    settings.queues.push(definition);
                }
            }
        }
        self.write_settings(&settings).await
    }

    async fn write_settings(&self, settings: &QueueSettings) -> OpsResult<()> {
        let payload = serde_json::to_vec(settings)?;
        self.broker.set(keys::QUEUE_SETTINGS, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use chrono::Utc;

    fn service() -> (Arc<MemoryBroker>, QueueControlService) {
        let broker = Arc::new(MemoryBroker::new());
        let service = QueueControlService::new(broker.clone(), AppConfig::default());
        (broker, service)
    }

    async fn seed_worker(broker: &MemoryBroker, id: &str, queues: &[&str], active_on: &[&str]) {
        let snapshot = WorkerSnapshot {
            id: id.to_string(),
            hostname: "host-a".to_string(),
            pid: 100,
            started_at: Utc::now(),
            heartbeat_at: Utc::now(),
            queues: queues.iter().map(|q| q.to_string()).collect(),
            registered_job_types: vec!["device.backup".to_string()],
            active: active_on
                .iter()
                .map(|q| ActiveTask {
                    task_id: uuid::Uuid::new_v4().to_string(),
                    job_type: "device.backup".to_string(),
                    queue: q.to_string(),
                    started_at: Utc::now(),
                })
                .collect(),
            processed: 10,
            failed: 1,
        };
        broker
            .set(
                &keys::worker(id),
                &serde_json::to_vec(&snapshot).unwrap(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn list_workers_empty_fleet_yields_empty_maps() {
        let (_broker, service) = service();
        let overview = service.list_workers().await.unwrap();
        assert!(overview.active_tasks.is_empty());
        assert!(overview.stats.is_empty());
    }

    #[tokio::test]
    async fn list_queues_includes_zero_consumer_queues() {
        let (broker, service) = service();
        seed_worker(&broker, "w-1", &["default", "backup"], &["backup"]).await;
        broker.push("backup", b"{}").await.unwrap();
        broker.push("backup", b"{}").await.unwrap();

        let queues = service.list_queues().await.unwrap();
        assert_eq!(queues.len(), 4);

        let backup = queues.iter().find(|q| q.name == "backup").unwrap();
        assert_eq!(backup.pending_tasks, 2);
        assert_eq!(backup.worker_count, 1);
        assert_eq!(backup.active_tasks, 1);
        assert_eq!(backup.exchange, "backup");

        let heavy = queues.iter().find(|q| q.name == "heavy").unwrap();
        assert_eq!(heavy.worker_count, 0);
        assert_eq!(heavy.pending_tasks, 0);
    }

    #[tokio::test]
    async fn purge_unknown_queue_is_not_found() {
        let (_broker, service) = service();
        let err = service.purge_queue("nope").await.unwrap_err();
        assert!(matches!(err, OpsError::NotFound { .. }));
    }

    #[tokio::test]
    async fn purge_empty_queue_succeeds_with_zero() {
        let (_broker, service) = service();
        assert_eq!(service.purge_queue("heavy").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn purge_all_isolates_per_queue_failure() {
        let (broker, service) = service();
        broker.push("default", b"{}").await.unwrap();
        broker.push("backup", b"{}").await.unwrap();
        broker.push("backup", b"{}").await.unwrap();
        broker.fail_drains_for("network");

        let report = service.purge_all_queues().await.unwrap();
        assert_eq!(report.queues.len(), 4);
        assert_eq!(report.total_purged, 3);

        let failed: Vec<&PurgeOutcome> = report
            .queues
            .iter()
            .filter(|o| o.error.is_some())
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].queue, "network");

        let backup = report.queues.iter().find(|o| o.queue == "backup").unwrap();
        assert_eq!(backup.purged, 2);

        // second pass on now-empty queues reports zero, still success
        broker.fail_drains_for("network"); // keep the injected failure
        let report = service.purge_all_queues().await.unwrap();
        let backup = report.queues.iter().find(|o| o.queue == "backup").unwrap();
        assert_eq!(backup.purged, 0);
        assert!(backup.error.is_none());
    }

    #[tokio::test]
    async fn beat_status_checks_lock_then_schedule_key() {
        let (broker, service) = service();
        assert!(!service.beat_status().await.unwrap().beat_running);

        broker.set(keys::BEAT_SCHEDULE, b"state").await.unwrap();
        assert!(service.beat_status().await.unwrap().beat_running);
    }

    #[tokio::test]
    async fn overall_status_counts_fleet() {
        let (broker, service) = service();
        seed_worker(&broker, "w-1", &["default"], &["default"]).await;
        seed_worker(&broker, "w-2", &["heavy"], &[]).await;

        let status = service.overall_status().await;
        assert!(status.redis_connected);
        assert_eq!(status.worker_count, 2);
        assert_eq!(status.active_tasks, 1);
        assert!(!status.beat_running);
    }

    #[tokio::test]
    async fn config_snapshot_hides_credentials() {
        let broker = Arc::new(MemoryBroker::new());
        let mut config = AppConfig::default();
        config.broker.url = "redis://:secret@broker.internal:6380/0".to_string();
        let service = QueueControlService::new(broker, config);

        let snapshot = service.config_snapshot().unwrap();
        assert_eq!(snapshot.broker.host, "broker.internal");
        assert_eq!(snapshot.broker.port, 6380);
        assert!(snapshot.broker.has_password);
        let rendered = serde_json::to_string(&snapshot).unwrap();
        assert!(!rendered.contains("secret"));
    }

    #[tokio::test]
    async fn settings_default_then_update_persists() {
        let (_broker, service) = service();
        let settings = service.get_settings().await.unwrap();
        assert_eq!(settings.queues.len(), 4);

        let updated = service
            .update_settings(QueueSettingsUpdate {
                max_workers: Some(8),
                cleanup_age_hours: Some(48),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.max_workers, 8);

        let reread = service.get_settings().await.unwrap();
        assert_eq!(reread.max_workers, 8);
        assert_eq!(reread.cleanup_age_hours, 48);
    }

    #[tokio::test]
    async fn settings_update_missing_built_in_is_rejected() {
        let (_broker, service) = service();
        let mut queues = QueueDefinition::built_in_set();
        queues.retain(|q| q.name != "backup");
        queues.push(QueueDefinition {
            name: "custom".to_string(),
            description: String::new(),
            built_in: false,
        });

        let err = service
            .update_settings(QueueSettingsUpdate {
                queues: Some(queues),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("backup"));
    }

    #[tokio::test]
    async fn settings_update_with_all_built_ins_and_custom_succeeds() {
        let (_broker, service) = service();
        let mut queues = QueueDefinition::built_in_set();
        queues.push(QueueDefinition {
            name: "custom".to_string(),
            description: "Tenant-specific work".to_string(),
            built_in: true, // lying client; normalized on write
        });

        let updated = service
            .update_settings(QueueSettingsUpdate {
                queues: Some(queues),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.queues.len(), 5);
        let custom = updated.queues.iter().find(|q| q.name == "custom").unwrap();
        assert!(!custom.built_in);
    }

    #[tokio::test]
    async fn ensure_builtin_queues_restores_missing_entries() {
        let (broker, service) = service();
        let mut settings = QueueSettings {
            queues: QueueDefinition::built_in_set(),
            max_workers: 4,
            cleanup_enabled: true,
            cleanup_interval_hours: 6,
            cleanup_age_hours: 24,
        };
        settings.queues.retain(|q| q.name != "network");
        broker
            .set(
                keys::QUEUE_SETTINGS,
                &serde_json::to_vec(&settings).unwrap(),
            )
            .await
            .unwrap();

        service.ensure_builtin_queues().await.unwrap();
        let restored = service.get_settings().await.unwrap();
        assert!(restored.queues.iter().any(|q| q.name == "network"));
        assert_eq!(restored.queues.len(), 4);
    }

    #[test]
    fn list_schedules_reports_configured_beat_entries() {
        let (_, service) = service();
        let schedules = service.list_schedules();
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].name, "periodic-cleanup");
        assert_eq!(schedules[0].task, "system.cleanup");
        assert_eq!(schedules[0].schedule, "every 6 hours");
        assert_eq!(schedules[0].options, json!({ "queue": "default" }));
    }
}
