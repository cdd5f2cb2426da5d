//! Removal of aged task result records.
//!
//! Split in two: `CleanupService` is the API-facing side (stats and
//! triggering), `CleanupExecutor` is the worker-side job that does the
//! actual deletion. Cleanup therefore runs through the same queue fabric
//! as every other job and is observable with the same status polling.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use opsboard_core::errors::OpsResult;
use opsboard_core::keys;
use opsboard_core::models::{ExecutionContext, ExecutionResult, TaskMessage, TaskMeta};
use opsboard_core::traits::{Broker, QueueClient};
use opsboard_dispatcher::JobExecutor;

use crate::control::QueueControlService;

pub const CLEANUP_JOB_TYPE: &str = "system.cleanup";

#[derive(Debug, Serialize)]
pub struct CleanupStats {
    pub retention_hours: i64,
    pub cutoff_time: DateTime<Utc>,
    pub total_result_keys: usize,
    pub message: String,
}

pub struct CleanupService {
    broker: Arc<dyn Broker>,
    queue_client: Arc<dyn QueueClient>,
    control: Arc<QueueControlService>,
}

impl CleanupService {
    pub fn new(
        broker: Arc<dyn Broker>,
        queue_client: Arc<dyn QueueClient>,
        control: Arc<QueueControlService>,
    ) -> Self {
        Self {
            broker,
            queue_client,
            control,
        }
    }

    async fn retention_hours(&self, override_hours: Option<i64>) -> OpsResult<i64> {
        match override_hours {
            Some(hours) => Ok(hours),
            None => Ok(self.control.get_settings().await?.cleanup_age_hours),
        }
    }

    /// Pure read: what a cleanup run would look at, without touching
    /// anything.
    pub async fn compute_stats(&self, retention_hours: Option<i64>) -> OpsResult<CleanupStats> {
        let retention = self.retention_hours(retention_hours).await?;
        let cutoff = Utc::now() - ChronoDuration::hours(retention);
        let result_keys = self.broker.scan(keys::TASK_META_PATTERN).await?;
        Ok(CleanupStats {
            retention_hours: retention,
            cutoff_time: cutoff,
            total_result_keys: result_keys.len(),
            message: format!(
                "{} result records present; records older than {} hours are eligible for cleanup",
                result_keys.len(),
                retention
            ),
        })
    }

    /// Submits the cleanup job onto the default queue and returns its task
    /// id immediately. Progress is observable via the normal status poll.
    pub async fn run_cleanup(&self, retention_hours: Option<i64>) -> OpsResult<String> {
        let retention = self.retention_hours(retention_hours).await?;
        let mut message = TaskMessage::new(CLEANUP_JOB_TYPE, "default");
        message.job_parameters = json!({ "retention_hours": retention });
        let task_id = self.queue_client.submit(message).await?;
        info!(task_id = %task_id, retention, "cleanup task submitted");
        Ok(task_id)
    }
}

/// Worker-side cleanup job: deletes result records older than the
/// configured retention.
pub struct CleanupExecutor {
    broker: Arc<dyn Broker>,
    default_retention_hours: i64,
}

impl CleanupExecutor {
    pub fn new(broker: Arc<dyn Broker>, default_retention_hours: i64) -> Self {
        Self {
            broker,
            default_retention_hours,
        }
    }

    async fn expired_meta_keys(&self, cutoff: DateTime<Utc>) -> OpsResult<(Vec<String>, usize)> {
        let all_keys = self.broker.scan(keys::TASK_META_PATTERN).await?;
        let scanned = all_keys.len();
        let mut expired = Vec::new();
        for key in all_keys {
            let Some(raw) = self.broker.get(&key).await? else {
                continue;
            };
            match serde_json::from_slice::<TaskMeta>(&raw) {
                Ok(meta) if meta.created_at < cutoff => expired.push(key),
                Ok(_) => {}
                Err(e) => warn!(key, error = %e, "skipping unreadable result record"),
            }
        }
        Ok((expired, scanned))
    }

    /// The revocation set only ever gains members during normal operation;
    /// once a task's result record has aged out, its mark is unreachable
    /// and must be dropped here or the set grows without bound.
    async fn trim_revoked(&self) -> OpsResult<u64> {
        let mut trimmed = 0;
        for task_id in self.broker.set_members(keys::REVOKED_SET).await? {
            if !self.broker.exists(&keys::task_meta(&task_id)).await? {
                self.broker.set_remove(keys::REVOKED_SET, &task_id).await?;
                trimmed += 1;
            }
        }
        Ok(trimmed)
    }
}

#[async_trait]
impl JobExecutor for CleanupExecutor {
    fn job_type(&self) -> &str {
        CLEANUP_JOB_TYPE
    }

    async fn run(&self, ctx: &ExecutionContext) -> ExecutionResult {
        let retention = ctx
            .job_parameters
            .get("retention_hours")
            .and_then(|v| v.as_i64())
            .unwrap_or(self.default_retention_hours);
        let cutoff = Utc::now() - ChronoDuration::hours(retention);

        let (expired, scanned) = match self.expired_meta_keys(cutoff).await {
            Ok(found) => found,
            Err(e) => return ExecutionResult::failure(format!("cleanup scan failed: {e}")),
        };
        let removed = match self.broker.delete(&expired).await {
            Ok(removed) => removed,
            Err(e) => return ExecutionResult::failure(format!("cleanup delete failed: {e}")),
        };
        let revoked_trimmed = match self.trim_revoked().await {
            Ok(trimmed) => trimmed,
            Err(e) => return ExecutionResult::failure(format!("revocation trim failed: {e}")),
        };

        info!(scanned, removed, revoked_trimmed, retention, "cleanup finished");
        ExecutionResult::ok(format!("removed {removed} aged result records"))
            .with_field("scanned", json!(scanned))
            .with_field("removed", json!(removed))
            .with_field("revoked_trimmed", json!(revoked_trimmed))
            .with_field("retention_hours", json!(retention))
    }
}
