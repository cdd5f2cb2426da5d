//! Task, queue, and execution models shared by the dispatcher, worker,
//! queue client, and control plane.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::traits::ProgressReporter;

/// Lifecycle states of one unit of asynchronous work.
///
/// Transitions are driven entirely by the worker fleet; the orchestration
/// layer only reads them and may request `Revoked` via cancellation.
///
/// A task id with no broker record reports `Pending`: queued-but-unseen is
/// indistinguishable from never-submitted. The original system carries the
/// same ambiguity and downstream dashboards depend on the seven-state set,
/// so no separate "unknown" state is introduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Started,
    Progress,
    Success,
    Failure,
    Retry,
    Revoked,
}

impl TaskState {
    /// Terminal states receive no further worker updates.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Success | TaskState::Failure | TaskState::Revoked
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Pending => "PENDING",
            TaskState::Started => "STARTED",
            TaskState::Progress => "PROGRESS",
            TaskState::Success => "SUCCESS",
            TaskState::Failure => "FAILURE",
            TaskState::Retry => "RETRY",
            TaskState::Revoked => "REVOKED",
        };
        f.write_str(s)
    }
}

/// Result-store record for one task, kept under `task-meta:<id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMeta {
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskMeta {
    pub fn pending() -> Self {
        let now = Utc::now();
        Self {
            state: TaskState::Pending,
            progress: None,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, state: TaskState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}

/// The orchestration layer's view of one task in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: String,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Queue payload for one unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub task_id: String,
    pub job_type: String,
    pub queue: String,
    #[serde(default)]
    pub schedule_id: Option<i64>,
    #[serde(default)]
    pub credential_id: Option<i64>,
    #[serde(default)]
    pub job_parameters: Value,
    #[serde(default)]
    pub target_devices: Vec<String>,
    #[serde(default)]
    pub template: Option<Value>,
    #[serde(default)]
    pub job_run_id: Option<i64>,
    pub submitted_at: DateTime<Utc>,
}

impl TaskMessage {
    pub fn new(job_type: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            job_type: job_type.into(),
            queue: queue.into(),
            schedule_id: None,
            credential_id: None,
            job_parameters: Value::Null,
            target_devices: Vec::new(),
            template: None,
            job_run_id: None,
            submitted_at: Utc::now(),
        }
    }
}

/// Uniform result shape produced by every executor.
///
/// `success` is always present; executors may attach a message, an error,
/// and arbitrary payload fields (flattened into the same object).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ExecutionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Normalized input handed to an executor, independent of how the work was
/// triggered (schedule, ad-hoc submission, periodic beat entry).
pub struct ExecutionContext {
    pub task_id: String,
    pub schedule_id: Option<i64>,
    pub credential_id: Option<i64>,
    pub job_parameters: Value,
    pub target_devices: Vec<String>,
    pub template: Option<Value>,
    pub job_run_id: Option<i64>,
    pub progress: Arc<dyn ProgressReporter>,
}

impl ExecutionContext {
    pub fn from_message(message: &TaskMessage, progress: Arc<dyn ProgressReporter>) -> Self {
        Self {
            task_id: message.task_id.clone(),
            schedule_id: message.schedule_id,
            credential_id: message.credential_id,
            job_parameters: message.job_parameters.clone(),
            target_devices: message.target_devices.clone(),
            template: message.template.clone(),
            job_run_id: message.job_run_id,
            progress,
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("task_id", &self.task_id)
            .field("schedule_id", &self.schedule_id)
            .field("job_run_id", &self.job_run_id)
            .field("target_devices", &self.target_devices.len())
            .finish()
    }
}

/// One task currently executing on a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveTask {
    pub task_id: String,
    pub job_type: String,
    pub queue: String,
    pub started_at: DateTime<Utc>,
}

/// Heartbeat snapshot one worker process publishes under `worker:<id>`.
///
/// Snapshots carry a TTL; a worker that stops heartbeating ages out of the
/// control plane instead of lingering as a ghost entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub id: String,
    pub hostname: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub heartbeat_at: DateTime<Utc>,
    pub queues: Vec<String>,
    pub registered_job_types: Vec<String>,
    pub active: Vec<ActiveTask>,
    pub processed: u64,
    pub failed: u64,
}

/// One configured queue. Routing follows the Celery direct-exchange
/// convention: exchange and routing key both equal the queue name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub built_in: bool,
}

pub const BUILT_IN_QUEUES: [&str; 4] = ["default", "backup", "network", "heavy"];

impl QueueDefinition {
    pub fn exchange(&self) -> &str {
        &self.name
    }

    pub fn routing_key(&self) -> &str {
        &self.name
    }

    /// The closed set of built-in queues every deployment carries.
    pub fn built_in_set() -> Vec<QueueDefinition> {
        [
            ("default", "General-purpose jobs"),
            ("backup", "Device configuration backups"),
            ("network", "Network-facing operations"),
            ("heavy", "Long-running or resource-heavy jobs"),
        ]
        .into_iter()
        .map(|(name, description)| QueueDefinition {
            name: name.to_string(),
            description: description.to_string(),
            built_in: true,
        })
        .collect()
    }

    /// Built-in queue names absent from `names`, sorted for stable error
    /// messages.
    pub fn missing_built_ins(names: &[&str]) -> Vec<String> {
        let present: HashSet<&str> = names.iter().copied().collect();
        let mut missing: Vec<String> = BUILT_IN_QUEUES
            .iter()
            .filter(|b| !present.contains(**b))
            .map(|b| b.to_string())
            .collect();
        missing.sort();
        missing
    }
}

/// Queue roster plus worker/cleanup knobs, persisted broker-side so every
/// instance sees the same effective settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    pub queues: Vec<QueueDefinition>,
    pub max_workers: usize,
    pub cleanup_enabled: bool,
    pub cleanup_interval_hours: u64,
    pub cleanup_age_hours: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_state_serializes_as_celery_strings() {
        assert_eq!(
            serde_json::to_string(&TaskState::Pending).unwrap(),
            "\"PENDING\""
        );
        assert_eq!(
            serde_json::from_str::<TaskState>("\"REVOKED\"").unwrap(),
            TaskState::Revoked
        );
    }

    #[test]
    fn terminal_states() {
        assert!(TaskState::Success.is_terminal());
        assert!(TaskState::Revoked.is_terminal());
        assert!(!TaskState::Progress.is_terminal());
        assert!(!TaskState::Retry.is_terminal());
    }

    #[test]
    fn execution_result_flattens_extra_fields() {
        let result = ExecutionResult::ok("done")
            .with_field("devices_processed", json!(3))
            .with_field("schedule_id", json!(7));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["devices_processed"], json!(3));
        assert_eq!(value["schedule_id"], json!(7));
    }

    #[test]
    fn missing_built_ins_reports_sorted_names() {
        let missing = QueueDefinition::missing_built_ins(&["default", "heavy", "custom1"]);
        assert_eq!(missing, vec!["backup".to_string(), "network".to_string()]);
        assert!(
            QueueDefinition::missing_built_ins(&["default", "backup", "network", "heavy"])
                .is_empty()
        );
    }

    #[test]
    fn task_meta_transition_touches_updated_at() {
        let mut meta = TaskMeta::pending();
        let before = meta.updated_at;
        meta.transition(TaskState::Started);
        assert_eq!(meta.state, TaskState::Started);
        assert!(meta.updated_at >= before);
        assert_eq!(meta.created_at, meta.created_at);
    }
}
