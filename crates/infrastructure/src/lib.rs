//! Infrastructure for the job subsystem: broker implementations, the queue
//! client, the control plane over the worker fleet, the cleanup service, the
//! namespaced TTL cache, and the database repositories.

pub mod broker;
pub mod cache;
pub mod cleanup;
pub mod control;
pub mod database;
pub mod queue_client;

pub use broker::{MemoryBroker, RedisBroker};
pub use cache::{PrefetchRegistry, TtlCache};
pub use cleanup::{CleanupExecutor, CleanupService, CleanupStats};
pub use control::{PurgeOutcome, QueueControlService};
pub use queue_client::BrokerQueueClient;
