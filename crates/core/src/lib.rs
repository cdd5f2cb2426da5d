//! Core types shared across the opsboard workspace: the error taxonomy,
//! runtime configuration, task/queue models, and the trait seams between the
//! orchestration layer and its infrastructure.

pub mod config;
pub mod errors;
pub mod keys;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use errors::{OpsError, OpsResult};
