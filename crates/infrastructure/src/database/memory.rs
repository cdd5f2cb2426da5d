//! In-memory repositories. Single-process, lock-per-call; enough for the
//! embedded mode and for exercising the domain rules in tests.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use opsboard_core::models::ExecutionResult;
use opsboard_core::{OpsError, OpsResult};
use opsboard_domain::entities::{JobSchedule, JobTemplate, JobTemplateUpdate, NewJobTemplate};
use opsboard_domain::repositories::{JobRunSink, JobTemplateRepository, ScheduleStore};

#[derive(Default)]
pub struct InMemoryTemplateRepository {
    templates: Mutex<Vec<JobTemplate>>,
    next_id: AtomicI64,
}

impl InMemoryTemplateRepository {
    pub fn new() -> Self {
        Self {
            templates: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

fn in_scope(template: &JobTemplate, owner_id: Option<i64>) -> bool {
    match owner_id {
        None => template.is_global,
        Some(owner) => template.owner_id == Some(owner),
    }
}

#[async_trait]
impl JobTemplateRepository for InMemoryTemplateRepository {
    async fn create(&self, template: NewJobTemplate) -> OpsResult<JobTemplate> {
        let now = Utc::now();
        let created = JobTemplate {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            name: template.name,
            job_type: template.job_type,
            description: template.description,
            is_global: template.is_global,
            owner_id: template.owner_id,
            created_by: template.created_by,
            created_at: now,
            updated_at: now,
        };
        self.templates.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> OpsResult<Option<JobTemplate>> {
        let templates = self.templates.lock().unwrap();
        Ok(templates.iter().find(|t| t.id == id).cloned())
    }

    async fn find_by_name(
        &self,
        name: &str,
        owner_id: Option<i64>,
    ) -> OpsResult<Option<JobTemplate>> {
        let templates = self.templates.lock().unwrap();
        Ok(templates
            .iter()
            .find(|t| t.name == name && in_scope(t, owner_id))
            .cloned())
    }

    async fn list(
        &self,
        owner_id: Option<i64>,
        job_type: Option<&str>,
    ) -> OpsResult<Vec<JobTemplate>> {
        let templates = self.templates.lock().unwrap();
        Ok(templates
            .iter()
            .filter(|t| t.is_global || (owner_id.is_some() && t.owner_id == owner_id))
            .filter(|t| job_type.map(|jt| t.job_type == jt).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn name_exists(
        &self,
        name: &str,
        owner_id: Option<i64>,
        exclude_id: Option<i64>,
    ) -> OpsResult<bool> {
        let templates = self.templates.lock().unwrap();
        Ok(templates.iter().any(|t| {
            t.name == name && in_scope(t, owner_id) && Some(t.id) != exclude_id
        }))
    }

    async fn update(&self, id: i64, fields: JobTemplateUpdate) -> OpsResult<Option<JobTemplate>> {
        let mut templates = self.templates.lock().unwrap();
        let Some(template) = templates.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };
        if let Some(name) = fields.name {
            template.name = name;
        }
        if let Some(description) = fields.description {
            template.description = Some(description);
        }
        if let Some(is_global) = fields.is_global {
            template.is_global = is_global;
            template.owner_id = fields.owner_id;
        }
        template.updated_at = Utc::now();
        Ok(Some(template.clone()))
    }

    async fn delete(&self, id: i64) -> OpsResult<bool> {
        let mut templates = self.templates.lock().unwrap();
        let before = templates.len();
        templates.retain(|t| t.id != id);
        Ok(templates.len() < before)
    }
}

#[derive(Default)]
pub struct InMemoryScheduleStore {
    schedules: Mutex<Vec<JobSchedule>>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schedules(schedules: Vec<JobSchedule>) -> Self {
        Self {
            schedules: Mutex::new(schedules),
        }
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn list(&self) -> OpsResult<Vec<JobSchedule>> {
        Ok(self.schedules.lock().unwrap().clone())
    }

    async fn set_next_run(&self, id: i64, next_run: DateTime<Utc>) -> OpsResult<()> {
        let mut schedules = self.schedules.lock().unwrap();
        let Some(schedule) = schedules.iter_mut().find(|s| s.id == id) else {
            return Err(OpsError::not_found(format!("schedule {id}")));
        };
        schedule.next_run = Some(next_run);
        Ok(())
    }
}

/// Records completions instead of writing rows; tests assert on them.
#[derive(Default)]
pub struct InMemoryJobRunSink {
    completions: Mutex<Vec<(i64, ExecutionResult)>>,
}

impl InMemoryJobRunSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn completions(&self) -> Vec<(i64, ExecutionResult)> {
        self.completions.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobRunSink for InMemoryJobRunSink {
    async fn record_completion(
        &self,
        job_run_id: i64,
        result: &ExecutionResult,
    ) -> OpsResult<()> {
        self.completions
            .lock()
            .unwrap()
            .push((job_run_id, result.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_template(name: &str, is_global: bool, owner_id: Option<i64>) -> NewJobTemplate {
        NewJobTemplate {
            name: name.to_string(),
            job_type: "device.backup".to_string(),
            description: None,
            is_global,
            owner_id,
            created_by: "tester".to_string(),
        }
    }

    #[tokio::test]
    async fn scoped_name_lookup() {
        let repo = InMemoryTemplateRepository::new();
        repo.create(new_template("nightly", true, None)).await.unwrap();
        repo.create(new_template("nightly", false, Some(7)))
            .await
            .unwrap();

        assert!(repo.find_by_name("nightly", None).await.unwrap().unwrap().is_global);
        assert_eq!(
            repo.find_by_name("nightly", Some(7))
                .await
                .unwrap()
                .unwrap()
                .owner_id,
            Some(7)
        );
        assert!(repo.find_by_name("nightly", Some(8)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_merges_global_and_private() {
        let repo = InMemoryTemplateRepository::new();
        repo.create(new_template("global-a", true, None)).await.unwrap();
        repo.create(new_template("mine", false, Some(1))).await.unwrap();
        repo.create(new_template("theirs", false, Some(2))).await.unwrap();

        let visible = repo.list(Some(1), None).await.unwrap();
        let names: Vec<&str> = visible.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["global-a", "mine"]);

        let anonymous = repo.list(None, None).await.unwrap();
        assert_eq!(anonymous.len(), 1);
    }

    #[tokio::test]
    async fn name_exists_honors_exclude_id() {
        let repo = InMemoryTemplateRepository::new();
        let created = repo.create(new_template("solo", true, None)).await.unwrap();
        assert!(repo.name_exists("solo", None, None).await.unwrap());
        assert!(!repo
            .name_exists("solo", None, Some(created.id))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn schedule_store_set_next_run() {
        let store = InMemoryScheduleStore::with_schedules(vec![JobSchedule {
            id: 5,
            job_type: "device.backup".to_string(),
            cron_expr: "0 0 3 * * *".to_string(),
            credential_id: None,
            target_devices: vec![],
            job_parameters: serde_json::Value::Null,
            template_id: None,
            next_run: None,
        }]);
        store.set_next_run(5, Utc::now()).await.unwrap();
        assert!(store.list().await.unwrap()[0].next_run.is_some());
        assert!(store.set_next_run(99, Utc::now()).await.is_err());
    }
}
