pub mod cache;
pub mod cleanup;
pub mod health;
pub mod queue;
pub mod templates;
