//! Worker runtime: consumes queued task messages, runs them through the
//! executor registry, and publishes state transitions and heartbeats back
//! to the broker.

pub mod progress;
pub mod runner;

pub use progress::BrokerProgressReporter;
pub use runner::WorkerRunner;
