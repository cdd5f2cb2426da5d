//! Full in-process lifecycle: submit, observe transitions, cancel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::broadcast;

use opsboard_core::config::WorkerConfig;
use opsboard_core::models::{ExecutionContext, ExecutionResult, TaskMessage, TaskState};
use opsboard_core::traits::{Broker, QueueClient};
use opsboard_dispatcher::{ExecutorRegistry, JobExecutor};
use opsboard_infrastructure::database::InMemoryJobRunSink;
use opsboard_infrastructure::{BrokerQueueClient, MemoryBroker};
use opsboard_worker::WorkerRunner;

const RESULT_TTL: Duration = Duration::from_secs(3600);

struct CountingExecutor {
    runs: Arc<AtomicU64>,
}

#[async_trait]
impl JobExecutor for CountingExecutor {
    fn job_type(&self) -> &str {
        "device.backup"
    }

    async fn run(&self, ctx: &ExecutionContext) -> ExecutionResult {
        ctx.progress
            .report(json!({ "status": "backing up", "percent": 40 }))
            .await;
        self.runs.fetch_add(1, Ordering::SeqCst);
        ExecutionResult::ok("backup complete").with_field("devices_processed", json!(2))
    }
}

struct Harness {
    broker: Arc<MemoryBroker>,
    client: BrokerQueueClient,
    sink: Arc<InMemoryJobRunSink>,
    runs: Arc<AtomicU64>,
    shutdown: broadcast::Sender<()>,
    worker: tokio::task::JoinHandle<()>,
}

async fn start_worker(queues: &[&str]) -> Harness {
    let broker = Arc::new(MemoryBroker::new());
    let runs = Arc::new(AtomicU64::new(0));
    let registry = Arc::new(ExecutorRegistry::new());
    registry
        .register(Arc::new(CountingExecutor { runs: runs.clone() }))
        .await;
    let sink = Arc::new(InMemoryJobRunSink::new());

    let config = WorkerConfig {
        concurrency: 1,
        heartbeat_interval_seconds: 1,
        heartbeat_ttl_seconds: 5,
        queues: queues.iter().map(|q| q.to_string()).collect(),
        ..WorkerConfig::default()
    };
    let runner = Arc::new(WorkerRunner::new(
        broker.clone(),
        registry,
        Some(sink.clone()),
        config,
        RESULT_TTL,
    ));
    let (shutdown, _) = broadcast::channel(1);
    let worker = tokio::spawn(runner.run(shutdown.clone()));

    Harness {
        client: BrokerQueueClient::new(broker.clone(), RESULT_TTL),
        broker,
        sink,
        runs,
        shutdown,
        worker,
    }
}

async fn wait_for_state(
    client: &BrokerQueueClient,
    task_id: &str,
    state: TaskState,
) -> opsboard_core::models::TaskStatus {
    for _ in 0..100 {
        let status = client.status(task_id).await.unwrap();
        if status.state == state {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("task {task_id} never reached {state}");
}

#[tokio::test]
async fn submitted_task_runs_to_success() {
    let harness = start_worker(&["default"]).await;

    let mut message = TaskMessage::new("device.backup", "default");
    message.job_run_id = Some(42);
    let task_id = harness.client.submit(message).await.unwrap();

    let status = wait_for_state(&harness.client, &task_id, TaskState::Success).await;
    let result = status.result.unwrap();
    assert_eq!(result["success"], json!(true));
    assert_eq!(result["devices_processed"], json!(2));
    assert_eq!(harness.runs.load(Ordering::SeqCst), 1);

    let completions = harness.sink.completions();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].0, 42);
    assert!(completions[0].1.success);

    harness.shutdown.send(()).unwrap();
    harness.worker.await.unwrap();
}

#[tokio::test]
async fn unknown_job_type_finishes_as_failure() {
    let harness = start_worker(&["default"]).await;

    let task_id = harness
        .client
        .submit(TaskMessage::new("no.such.job", "default"))
        .await
        .unwrap();

    let status = wait_for_state(&harness.client, &task_id, TaskState::Failure).await;
    assert!(status.error.unwrap().contains("no.such.job"));

    harness.shutdown.send(()).unwrap();
    harness.worker.await.unwrap();
}

#[tokio::test]
async fn cancelled_pending_task_is_never_executed() {
    // Worker subscribed to "default" only; the task parks on "backup".
    let harness = start_worker(&["default"]).await;

    let task_id = harness
        .client
        .submit(TaskMessage::new("device.backup", "backup"))
        .await
        .unwrap();
    assert_eq!(
        harness.client.status(&task_id).await.unwrap().state,
        TaskState::Pending
    );

    harness.client.cancel(&task_id, false).await.unwrap();
    assert_eq!(
        harness.client.status(&task_id).await.unwrap().state,
        TaskState::Revoked
    );

    // Even once a worker picks the queue up, the revoked task is skipped.
    let registry = Arc::new(ExecutorRegistry::new());
    registry
        .register(Arc::new(CountingExecutor {
            runs: harness.runs.clone(),
        }))
        .await;
    let config = WorkerConfig {
        concurrency: 1,
        queues: vec!["backup".to_string()],
        ..WorkerConfig::default()
    };
    let runner = Arc::new(WorkerRunner::new(
        harness.broker.clone(),
        registry,
        None,
        config,
        RESULT_TTL,
    ));
    let (stop, _) = broadcast::channel(1);
    let backup_worker = tokio::spawn(runner.run(stop.clone()));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(harness.runs.load(Ordering::SeqCst), 0);
    assert_eq!(
        harness.client.status(&task_id).await.unwrap().state,
        TaskState::Revoked
    );
    assert_eq!(harness.broker.queue_len("backup").await.unwrap(), 0);

    stop.send(()).unwrap();
    backup_worker.await.unwrap();
    harness.shutdown.send(()).unwrap();
    harness.worker.await.unwrap();
}

#[tokio::test]
async fn heartbeat_snapshot_is_published() {
    let harness = start_worker(&["default"]).await;

    let mut snapshot_keys = Vec::new();
    for _ in 0..50 {
        snapshot_keys = harness.broker.scan("worker:*").await.unwrap();
        if !snapshot_keys.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(snapshot_keys.len(), 1);

    let raw = harness.broker.get(&snapshot_keys[0]).await.unwrap().unwrap();
    let snapshot: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(snapshot["queues"], json!(["default"]));
    assert_eq!(snapshot["registered_job_types"], json!(["device.backup"]));

    harness.shutdown.send(()).unwrap();
    harness.worker.await.unwrap();
}
