//! Broker implementations.
//!
//! `RedisBroker` is the production backend; `MemoryBroker` backs embedded
//! mode and tests. Both speak the logical key layout from
//! `opsboard_core::keys` and apply their own storage details underneath.

mod memory;
mod redis;

pub use memory::MemoryBroker;
pub use redis::RedisBroker;
