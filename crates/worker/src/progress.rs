//! Progress reporting backed by the shared result store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use opsboard_core::keys;
use opsboard_core::models::{TaskMeta, TaskState};
use opsboard_core::traits::{Broker, ProgressReporter};

/// Writes `PROGRESS` updates into the task's result record, where status
/// polls pick them up.
pub struct BrokerProgressReporter {
    broker: Arc<dyn Broker>,
    task_id: String,
    result_ttl: Duration,
}

impl BrokerProgressReporter {
    pub fn new(broker: Arc<dyn Broker>, task_id: String, result_ttl: Duration) -> Self {
        Self {
            broker,
            task_id,
            result_ttl,
        }
    }

    async fn write(&self, progress: Value) -> opsboard_core::OpsResult<()> {
        let key = keys::task_meta(&self.task_id);
        let mut meta = match self.broker.get(&key).await? {
            Some(raw) => serde_json::from_slice::<TaskMeta>(&raw)?,
            None => TaskMeta::pending(),
        };
        if meta.state.is_terminal() {
            // A late update must not resurrect a finished task.
            return Ok(());
        }
        meta.transition(TaskState::Progress);
        meta.progress = Some(progress);
        self.broker
            .set_with_ttl(&key, &serde_json::to_vec(&meta)?, self.result_ttl)
            .await
    }
}

#[async_trait]
impl ProgressReporter for BrokerProgressReporter {
    async fn report(&self, progress: Value) {
        if let Err(e) = self.write(progress).await {
            warn!(task_id = %self.task_id, error = %e, "progress update dropped");
        }
    }
}
