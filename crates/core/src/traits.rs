//! Trait seams between the orchestration layer and its infrastructure.
//!
//! Everything behind these traits is a discrete round trip against shared
//! mutable state (the broker and result store); implementations must tolerate
//! interleaving from other workers and instances between calls.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::OpsResult;
use crate::models::{TaskMessage, TaskStatus};

/// Low-level operations against the shared broker/result store.
///
/// Key names passed here are logical (unprefixed); implementations apply
/// their own instance prefix.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Connectivity probe with a bounded timeout. Failing or slow brokers
    /// return an error; this must never hang the requesting call.
    async fn ping(&self) -> OpsResult<()>;

    async fn queue_len(&self, queue: &str) -> OpsResult<u64>;

    async fn push(&self, queue: &str, payload: &[u8]) -> OpsResult<()>;

    /// Blocking pop across `queues` in priority order. `None` on timeout.
    /// Returns the logical queue name the payload came from.
    async fn pop(
        &self,
        queues: &[String],
        timeout: Duration,
    ) -> OpsResult<Option<(String, Vec<u8>)>>;

    /// Atomically remove every pending message from a queue and return the
    /// removed count. A single drain, not a count-then-delete sequence.
    async fn drain_queue(&self, queue: &str) -> OpsResult<u64>;

    async fn get(&self, key: &str) -> OpsResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8]) -> OpsResult<()>;

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> OpsResult<()>;

    /// Delete keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> OpsResult<u64>;

    /// All keys matching a glob pattern (e.g. `task-meta:*`).
    async fn scan(&self, pattern: &str) -> OpsResult<Vec<String>>;

    async fn exists(&self, key: &str) -> OpsResult<bool>;

    /// Membership set used for task revocation marks.
    async fn set_add(&self, set: &str, member: &str) -> OpsResult<()>;

    async fn set_contains(&self, set: &str, member: &str) -> OpsResult<bool>;

    async fn set_members(&self, set: &str) -> OpsResult<Vec<String>>;

    async fn set_remove(&self, set: &str, member: &str) -> OpsResult<()>;
}

/// Submission and inspection of asynchronous work.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Enqueue a unit of work; returns its task id immediately.
    async fn submit(&self, message: TaskMessage) -> OpsResult<String>;

    /// Current status. Ids the broker has no record of report `PENDING`
    /// (see `TaskState` on why that ambiguity is preserved).
    async fn status(&self, task_id: &str) -> OpsResult<TaskStatus>;

    /// Best-effort cancellation. `REVOKED` means "no further progress
    /// guaranteed", not "guaranteed stopped": a task past its last
    /// revocation check still runs to completion.
    async fn cancel(&self, task_id: &str, terminate: bool) -> OpsResult<()>;
}

/// Channel through which a running executor publishes progress updates.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report(&self, progress: Value);
}

/// Reporter for contexts with nowhere to publish progress (tests, dispatch
/// of fire-and-forget units).
pub struct NoopProgress;

#[async_trait]
impl ProgressReporter for NoopProgress {
    async fn report(&self, _progress: Value) {}
}
