use async_trait::async_trait;
use opsboard_core::models::{ExecutionContext, ExecutionResult};
use serde_json::json;
use tracing::info;

/// Capability interface for one job type.
///
/// `run` is infallible by signature: executor failures are reported in-band
/// as `success: false` so callers always receive a uniform result shape.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    fn job_type(&self) -> &str;

    async fn run(&self, ctx: &ExecutionContext) -> ExecutionResult;
}

/// Reference executor demonstrating the contract: reports progress, echoes
/// its inputs, succeeds.
pub struct ExampleExecutor;

#[async_trait]
impl JobExecutor for ExampleExecutor {
    fn job_type(&self) -> &str {
        "example"
    }

    async fn run(&self, ctx: &ExecutionContext) -> ExecutionResult {
        info!(
            task_id = %ctx.task_id,
            schedule_id = ?ctx.schedule_id,
            job_run_id = ?ctx.job_run_id,
            "running example job"
        );

        ctx.progress
            .report(json!({ "status": "working", "percent": 50 }))
            .await;

        ExecutionResult::ok("Example job completed successfully")
            .with_field("schedule_id", json!(ctx.schedule_id))
            .with_field("job_run_id", json!(ctx.job_run_id))
            .with_field("job_parameters", ctx.job_parameters.clone())
            .with_field("target_devices", json!(ctx.target_devices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsboard_core::traits::NoopProgress;
    use std::sync::Arc;

    fn context() -> ExecutionContext {
        ExecutionContext {
            task_id: "t-1".to_string(),
            schedule_id: Some(9),
            credential_id: None,
            job_parameters: json!({"depth": 2}),
            target_devices: vec!["sw-01".to_string()],
            template: None,
            job_run_id: Some(42),
            progress: Arc::new(NoopProgress),
        }
    }

    #[tokio::test]
    async fn example_executor_echoes_inputs() {
        let result = ExampleExecutor.run(&context()).await;
        assert!(result.success);
        assert_eq!(result.extra["schedule_id"], json!(9));
        assert_eq!(result.extra["job_run_id"], json!(42));
        assert_eq!(result.extra["target_devices"], json!(["sw-01"]));
    }
}
