//! The worker loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use opsboard_core::config::WorkerConfig;
use opsboard_core::keys;
use opsboard_core::models::{
    ActiveTask, ExecutionContext, ExecutionResult, TaskMessage, TaskMeta, TaskState,
    WorkerSnapshot,
};
use opsboard_core::traits::Broker;
use opsboard_core::OpsResult;
use opsboard_dispatcher::{ExecutorRegistry, JobDispatcher};
use opsboard_domain::JobRunSink;

use crate::progress::BrokerProgressReporter;

const POP_TIMEOUT: Duration = Duration::from_secs(1);

/// One worker process: N consumer loops over the subscribed queues plus a
/// heartbeat publisher. All state transitions go through the shared result
/// store, so any instance can answer status polls for tasks this worker ran.
pub struct WorkerRunner {
    id: String,
    hostname: String,
    queues: Vec<String>,
    broker: Arc<dyn Broker>,
    dispatcher: JobDispatcher,
    registry: Arc<ExecutorRegistry>,
    job_run_sink: Option<Arc<dyn JobRunSink>>,
    config: WorkerConfig,
    result_ttl: Duration,
    started_at: DateTime<Utc>,
    active: Mutex<HashMap<String, ActiveTask>>,
    processed: AtomicU64,
    failed: AtomicU64,
}

impl WorkerRunner {
    pub fn new(
        broker: Arc<dyn Broker>,
        registry: Arc<ExecutorRegistry>,
        job_run_sink: Option<Arc<dyn JobRunSink>>,
        config: WorkerConfig,
        result_ttl: Duration,
    ) -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown-host".to_string());
        let id = format!("{}-{}", hostname, &uuid::Uuid::new_v4().to_string()[..8]);
        Self {
            id,
            hostname,
            queues: config.queues.clone(),
            broker,
            dispatcher: JobDispatcher::new(registry.clone()),
            registry,
            job_run_sink,
            config,
            result_ttl,
            started_at: Utc::now(),
            active: Mutex::new(HashMap::new()),
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Runs consumers and the heartbeat until the shutdown signal fires.
    /// In-flight tasks finish; the worker key is removed on the way out.
    pub async fn run(self: Arc<Self>, shutdown: broadcast::Sender<()>) {
        info!(
            worker_id = %self.id,
            queues = ?self.queues,
            concurrency = self.config.concurrency,
            "worker starting"
        );

        let heartbeat = {
            let runner = self.clone();
            let mut stop = shutdown.subscribe();
            tokio::spawn(async move {
                let interval = Duration::from_secs(runner.config.heartbeat_interval_seconds);
                loop {
                    if let Err(e) = runner.publish_heartbeat().await {
                        warn!(error = %e, "heartbeat publish failed");
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {}
                        _ = stop.recv() => break,
                    }
                }
            })
        };

        let mut consumers = Vec::with_capacity(self.config.concurrency);
        for _ in 0..self.config.concurrency {
            let runner = self.clone();
            let mut stop = shutdown.subscribe();
            consumers.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = stop.recv() => break,
                        popped = runner.broker.pop(&runner.queues, POP_TIMEOUT) => {
                            match popped {
                                Ok(Some((queue, payload))) => {
                                    runner.process(&queue, &payload).await;
                                }
                                Ok(None) => {}
                                Err(e) => {
                                    error!(error = %e, "queue pop failed, backing off");
                                    tokio::time::sleep(Duration::from_secs(1)).await;
                                }
                            }
                        }
                    }
                }
            }));
        }

        for consumer in consumers {
            let _ = consumer.await;
        }
        let _ = heartbeat.await;
        if let Err(e) = self.broker.delete(&[keys::worker(&self.id)]).await {
            warn!(error = %e, "failed to remove worker snapshot");
        }
        info!(worker_id = %self.id, "worker stopped");
    }

    async fn process(&self, queue: &str, payload: &[u8]) {
        let message: TaskMessage = match serde_json::from_slice(payload) {
            Ok(message) => message,
            Err(e) => {
                error!(queue, error = %e, "dropping undecodable task message");
                return;
            }
        };
        let task_id = message.task_id.clone();

        match self.broker.set_contains(keys::REVOKED_SET, &task_id).await {
            Ok(true) => {
                info!(task_id = %task_id, "skipping revoked task");
                if let Err(e) = self.mark(&task_id, TaskState::Revoked, None, None).await {
                    warn!(task_id = %task_id, error = %e, "failed to ack revocation");
                }
                return;
            }
            Ok(false) => {}
            Err(e) => {
                // Can't tell; run it rather than silently dropping work.
                warn!(task_id = %task_id, error = %e, "revocation check failed");
            }
        }

        if let Err(e) = self.mark(&task_id, TaskState::Started, None, None).await {
            warn!(task_id = %task_id, error = %e, "failed to mark task started");
        }
        self.track_active(&message, queue);

        let reporter = Arc::new(BrokerProgressReporter::new(
            self.broker.clone(),
            task_id.clone(),
            self.result_ttl,
        ));
        let ctx = ExecutionContext::from_message(&message, reporter);
        let result = self.dispatcher.dispatch(&message.job_type, &ctx).await;

        self.finish(&message, &result).await;
        self.active.lock().unwrap().remove(&task_id);
    }

    fn track_active(&self, message: &TaskMessage, queue: &str) {
        self.active.lock().unwrap().insert(
            message.task_id.clone(),
            ActiveTask {
                task_id: message.task_id.clone(),
                job_type: message.job_type.clone(),
                queue: queue.to_string(),
                started_at: Utc::now(),
            },
        );
    }

    async fn finish(&self, message: &TaskMessage, result: &ExecutionResult) {
        let task_id = &message.task_id;
        let outcome = if result.success {
            self.processed.fetch_add(1, Ordering::Relaxed);
            self.mark(
                task_id,
                TaskState::Success,
                Some(serde_json::to_value(result).unwrap_or(json!(null))),
                None,
            )
            .await
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
            self.mark(
                task_id,
                TaskState::Failure,
                None,
                result.error.clone(),
            )
            .await
        };
        if let Err(e) = outcome {
            error!(task_id = %task_id, error = %e, "failed to record task outcome");
        }

        if let (Some(job_run_id), Some(sink)) = (message.job_run_id, &self.job_run_sink) {
            if let Err(e) = sink.record_completion(job_run_id, result).await {
                error!(job_run_id, error = %e, "failed to record job run completion");
            }
        }
        info!(
            task_id = %task_id,
            job_type = %message.job_type,
            success = result.success,
            "task finished"
        );
    }

    /// State transition that preserves `created_at` from the existing
    /// record. A terminal state is never overwritten (a revoked task that
    /// finished anyway stays revoked).
    async fn mark(
        &self,
        task_id: &str,
        state: TaskState,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> OpsResult<()> {
        let key = keys::task_meta(task_id);
        let mut meta = match self.broker.get(&key).await? {
            Some(raw) => serde_json::from_slice::<TaskMeta>(&raw)?,
            None => TaskMeta::pending(),
        };
        if meta.state.is_terminal() {
            return Ok(());
        }
        meta.transition(state);
        meta.result = result;
        meta.error = error;
        self.broker
            .set_with_ttl(&key, &serde_json::to_vec(&meta)?, self.result_ttl)
            .await
    }

    async fn publish_heartbeat(&self) -> OpsResult<()> {
        let snapshot = WorkerSnapshot {
            id: self.id.clone(),
            hostname: self.hostname.clone(),
            pid: std::process::id(),
            started_at: self.started_at,
            heartbeat_at: Utc::now(),
            queues: self.queues.clone(),
            registered_job_types: self.registry.job_types().await,
            active: self.active.lock().unwrap().values().cloned().collect(),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        };
        self.broker
            .set_with_ttl(
                &keys::worker(&self.id),
                &serde_json::to_vec(&snapshot)?,
                Duration::from_secs(self.config.heartbeat_ttl_seconds),
            )
            .await
    }
}
