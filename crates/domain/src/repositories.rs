//! Data-access abstractions, implemented over Postgres in production and
//! in-memory for tests and the embedded mode.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opsboard_core::OpsResult;
use opsboard_core::models::ExecutionResult;

use crate::entities::{JobSchedule, JobTemplate, JobTemplateUpdate, NewJobTemplate};

#[async_trait]
pub trait JobTemplateRepository: Send + Sync {
    async fn create(&self, template: NewJobTemplate) -> OpsResult<JobTemplate>;

    async fn find_by_id(&self, id: i64) -> OpsResult<Option<JobTemplate>>;

    /// Lookup by name within one scope: `owner_id: None` searches the global
    /// catalog, `Some(u)` searches user `u`'s private catalog.
    async fn find_by_name(&self, name: &str, owner_id: Option<i64>)
        -> OpsResult<Option<JobTemplate>>;

    /// Global templates, plus `owner_id`'s private templates when given,
    /// optionally filtered by job type. Insertion (id) order.
    async fn list(
        &self,
        owner_id: Option<i64>,
        job_type: Option<&str>,
    ) -> OpsResult<Vec<JobTemplate>>;

    /// Does `name` already exist in the given scope? `exclude_id` skips the
    /// template being renamed.
    async fn name_exists(
        &self,
        name: &str,
        owner_id: Option<i64>,
        exclude_id: Option<i64>,
    ) -> OpsResult<bool>;

    async fn update(&self, id: i64, fields: JobTemplateUpdate) -> OpsResult<Option<JobTemplate>>;

    /// `true` iff a row was removed; deleting an absent id is not an error.
    async fn delete(&self, id: i64) -> OpsResult<bool>;
}

/// Access to the external schedule table. The orchestration layer is limited
/// to reading schedules and initializing a missing `next_run` exactly once.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn list(&self) -> OpsResult<Vec<JobSchedule>>;

    async fn set_next_run(&self, id: i64, next_run: DateTime<Utc>) -> OpsResult<()>;
}

/// Completion sink for external job-run records. The worker writes the
/// completion payload; the row's lifecycle belongs to the jobs service.
#[async_trait]
pub trait JobRunSink: Send + Sync {
    async fn record_completion(&self, job_run_id: i64, result: &ExecutionResult)
        -> OpsResult<()>;
}
