//! Logical broker key layout.
//!
//! Every key here is unprefixed; the broker implementation applies the
//! per-deployment instance prefix. Keeping the layout in one place means the
//! queue client, control plane, cleanup task, and workers can never disagree
//! about where state lives.

/// Pending messages for a queue live in `queue:<name>`.
pub fn queue(name: &str) -> String {
    format!("queue:{name}")
}

/// Result-store record for one task.
pub fn task_meta(task_id: &str) -> String {
    format!("task-meta:{task_id}")
}

/// Glob matching every task result record.
pub const TASK_META_PATTERN: &str = "task-meta:*";

/// Heartbeat snapshot for one worker process.
pub fn worker(worker_id: &str) -> String {
    format!("worker:{worker_id}")
}

/// Glob matching every live worker snapshot.
pub const WORKER_PATTERN: &str = "worker:*";

/// Membership set of revoked task ids.
pub const REVOKED_SET: &str = "revoked";

/// Mutual-exclusion lock held by a running beat scheduler.
pub const BEAT_LOCK: &str = "beat:lock";

/// Persisted schedule state written by the beat scheduler.
pub const BEAT_SCHEDULE: &str = "beat:schedule";

/// Shared queue settings document.
pub const QUEUE_SETTINGS: &str = "settings:queues";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_shapes() {
        assert_eq!(queue("default"), "queue:default");
        assert_eq!(task_meta("abc"), "task-meta:abc");
        assert_eq!(worker("w-1"), "worker:w-1");
    }
}
