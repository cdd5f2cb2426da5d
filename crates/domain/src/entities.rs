use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named, reusable job definition. Global templates are visible to every
/// user; private templates belong to exactly one owner.
///
/// Invariant: `owner_id` is present iff the template is not global. Name
/// uniqueness is scoped — the global catalog is one namespace, each owner's
/// private catalog is another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTemplate {
    pub id: i64,
    pub name: String,
    pub job_type: String,
    pub description: Option<String>,
    pub is_global: bool,
    pub owner_id: Option<i64>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for template creation; the id and timestamps are assigned by the
/// repository.
#[derive(Debug, Clone, Deserialize)]
pub struct NewJobTemplate {
    pub name: String,
    pub job_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_global: bool,
    pub owner_id: Option<i64>,
    pub created_by: String,
}

/// Partial update. Only present fields are applied; scope changes follow the
/// rules in `JobTemplateService::update`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobTemplateUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_global: Option<bool>,
    pub owner_id: Option<i64>,
}

/// External schedule record, referenced by id at dispatch time. The
/// orchestration layer does not own its lifecycle; it only initializes a
/// missing `next_run` on first encounter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSchedule {
    pub id: i64,
    pub job_type: String,
    pub cron_expr: String,
    pub credential_id: Option<i64>,
    pub target_devices: Vec<String>,
    pub job_parameters: Value,
    pub template_id: Option<i64>,
    pub next_run: Option<DateTime<Utc>>,
}
