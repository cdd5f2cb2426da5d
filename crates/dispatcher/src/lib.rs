//! Job dispatch: the executor capability trait, the job-type registry, and
//! the dispatcher that maps a declarative job definition onto one of them.
//!
//! Adding a job type means registering a new executor; the dispatch path
//! never grows per-type branches.

pub mod dispatch;
pub mod executor;
pub mod registry;
pub mod schedules;

pub use dispatch::JobDispatcher;
pub use executor::{ExampleExecutor, JobExecutor};
pub use registry::ExecutorRegistry;
pub use schedules::initialize_schedule_next_runs;
