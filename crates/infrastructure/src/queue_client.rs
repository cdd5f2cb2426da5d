//! Task submission and inspection over any [`Broker`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use opsboard_core::errors::OpsResult;
use opsboard_core::keys;
use opsboard_core::models::{TaskMessage, TaskMeta, TaskState, TaskStatus};
use opsboard_core::traits::{Broker, QueueClient};

/// Queue client over the shared broker. Submission writes the pending
/// result record before pushing the message, so a status poll racing the
/// push still sees `PENDING` rather than nothing.
pub struct BrokerQueueClient {
    broker: Arc<dyn Broker>,
    result_ttl: Duration,
}

impl BrokerQueueClient {
    pub fn new(broker: Arc<dyn Broker>, result_ttl: Duration) -> Self {
        Self { broker, result_ttl }
    }

    async fn write_meta(&self, task_id: &str, meta: &TaskMeta) -> OpsResult<()> {
        let payload = serde_json::to_vec(meta)?;
        self.broker
            .set_with_ttl(&keys::task_meta(task_id), &payload, self.result_ttl)
            .await
    }
}

#[async_trait]
impl QueueClient for BrokerQueueClient {
    async fn submit(&self, message: TaskMessage) -> OpsResult<String> {
        let task_id = message.task_id.clone();
        self.write_meta(&task_id, &TaskMeta::pending()).await?;
        let payload = serde_json::to_vec(&message)?;
        self.broker.push(&message.queue, &payload).await?;
        info!(
            task_id = %task_id,
            job_type = %message.job_type,
            queue = %message.queue,
            "task submitted"
        );
        Ok(task_id)
    }

    async fn status(&self, task_id: &str) -> OpsResult<TaskStatus> {
        let raw = self.broker.get(&keys::task_meta(task_id)).await?;
        let Some(raw) = raw else {
            // No record: queued-but-unseen or never submitted. Reported as
            // PENDING either way, matching what dashboards already expect.
            return Ok(TaskStatus {
                task_id: task_id.to_string(),
                state: TaskState::Pending,
                progress: Some(json!({
                    "status": "Task is queued and waiting to start"
                })),
                result: None,
                error: None,
            });
        };
        let meta: TaskMeta = serde_json::from_slice(&raw)?;
        Ok(TaskStatus {
            task_id: task_id.to_string(),
            state: meta.state,
            progress: meta.progress,
            result: meta.result,
            error: meta.error,
        })
    }

    async fn cancel(&self, task_id: &str, terminate: bool) -> OpsResult<()> {
        self.broker
            .set_add(keys::REVOKED_SET, task_id)
            .await?;
        let mut meta = match self.broker.get(&keys::task_meta(task_id)).await? {
            Some(raw) => serde_json::from_slice(&raw)?,
            None => TaskMeta::pending(),
        };
        if meta.state.is_terminal() && meta.state != TaskState::Revoked {
            // Already finished; leave the final state alone.
            warn!(task_id, state = %meta.state, "cancel requested for finished task");
            return Ok(());
        }
        meta.transition(TaskState::Revoked);
        self.write_meta(task_id, &meta).await?;
        info!(task_id, terminate, "task revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;

    fn client() -> (Arc<MemoryBroker>, BrokerQueueClient) {
        let broker = Arc::new(MemoryBroker::new());
        let client = BrokerQueueClient::new(broker.clone(), Duration::from_secs(3600));
        (broker, client)
    }

    #[tokio::test]
    async fn submit_queues_message_and_records_pending() {
        let (broker, client) = client();
        let message = TaskMessage::new("device.backup", "backup");
        let task_id = client.submit(message).await.unwrap();

        assert_eq!(broker.queue_len("backup").await.unwrap(), 1);
        let status = client.status(&task_id).await.unwrap();
        assert_eq!(status.state, TaskState::Pending);
    }

    #[tokio::test]
    async fn unknown_task_reports_pending_with_waiting_note() {
        let (_broker, client) = client();
        let status = client.status("no-such-task").await.unwrap();
        assert_eq!(status.state, TaskState::Pending);
        let note = status.progress.unwrap();
        assert!(note["status"].as_str().unwrap().contains("waiting"));
    }

    #[tokio::test]
    async fn cancel_marks_revoked_and_adds_to_set() {
        let (broker, client) = client();
        let task_id = client
            .submit(TaskMessage::new("device.backup", "default"))
            .await
            .unwrap();
        client.cancel(&task_id, false).await.unwrap();

        assert!(broker
            .set_contains(keys::REVOKED_SET, &task_id)
            .await
            .unwrap());
        let status = client.status(&task_id).await.unwrap();
        assert_eq!(status.state, TaskState::Revoked);
    }

    #[tokio::test]
    async fn cancel_leaves_finished_tasks_alone() {
        let (broker, client) = client();
        let task_id = client
            .submit(TaskMessage::new("device.backup", "default"))
            .await
            .unwrap();
        let mut meta = TaskMeta::pending();
        meta.transition(TaskState::Success);
        broker
            .set(
                &keys::task_meta(&task_id),
                &serde_json::to_vec(&meta).unwrap(),
            )
            .await
            .unwrap();

        client.cancel(&task_id, true).await.unwrap();
        let status = client.status(&task_id).await.unwrap();
        assert_eq!(status.state, TaskState::Success);
    }
}
