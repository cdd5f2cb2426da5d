use std::sync::Arc;

use opsboard_core::models::{ExecutionContext, ExecutionResult};
use tracing::warn;

use crate::registry::ExecutorRegistry;

/// Maps a job type to its executor and invokes it with a normalized context.
pub struct JobDispatcher {
    registry: Arc<ExecutorRegistry>,
}

impl JobDispatcher {
    pub fn new(registry: Arc<ExecutorRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        &self.registry
    }

    /// Dispatch never fails out-of-band: an unknown job type yields a
    /// structured `success: false` result, so every caller sees the same
    /// result shape regardless of outcome.
    pub async fn dispatch(&self, job_type: &str, ctx: &ExecutionContext) -> ExecutionResult {
        match self.registry.get(job_type).await {
            Some(executor) => executor.run(ctx).await,
            None => {
                warn!(job_type, task_id = %ctx.task_id, "no executor registered");
                ExecutionResult::failure(format!("Unknown job type: {job_type}"))
            }
        }
    }
}
