//! Repository implementations: Postgres in production, in-memory for the
//! embedded mode and tests.

mod memory;
mod postgres;

pub use memory::{InMemoryJobRunSink, InMemoryScheduleStore, InMemoryTemplateRepository};
pub use postgres::{
    connect_pool, run_migrations, PostgresJobRunSink, PostgresScheduleStore,
    PostgresTemplateRepository,
};
