//! Domain entities and business rules for the job subsystem: the template
//! catalog with its scoped-uniqueness rules, and the seams to the external
//! schedule and run records.

pub mod entities;
pub mod repositories;
pub mod services;

pub use entities::{JobSchedule, JobTemplate, JobTemplateUpdate, NewJobTemplate};
pub use repositories::{JobRunSink, JobTemplateRepository, ScheduleStore};
pub use services::{JobTemplateService, JobTypeInfo};
