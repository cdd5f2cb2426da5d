//! Business logic for the job template catalog.

use std::sync::Arc;

use opsboard_core::{OpsError, OpsResult};
use serde::Serialize;
use tracing::info;

use crate::entities::{JobTemplate, JobTemplateUpdate, NewJobTemplate};
use crate::repositories::JobTemplateRepository;

/// Catalog entry describing one registered job type.
#[derive(Debug, Clone, Serialize)]
pub struct JobTypeInfo {
    pub value: String,
    pub label: String,
    pub description: String,
}

impl JobTypeInfo {
    pub fn new(value: &str, label: &str, description: &str) -> Self {
        Self {
            value: value.to_string(),
            label: label.to_string(),
            description: description.to_string(),
        }
    }
}

/// Template catalog with scoped name uniqueness.
///
/// The allowed job types are injected at assembly from the executor
/// registry, so the catalog and the dispatch table can never drift apart.
pub struct JobTemplateService {
    repo: Arc<dyn JobTemplateRepository>,
    job_types: Vec<JobTypeInfo>,
}

impl JobTemplateService {
    pub fn new(repo: Arc<dyn JobTemplateRepository>, job_types: Vec<JobTypeInfo>) -> Self {
        Self { repo, job_types }
    }

    pub async fn create(&self, template: NewJobTemplate) -> OpsResult<JobTemplate> {
        if template.name.trim().is_empty() {
            return Err(OpsError::validation("template name must not be empty"));
        }
        if !template.is_global && template.owner_id.is_none() {
            return Err(OpsError::validation(
                "a private template requires an owner_id",
            ));
        }
        if !self.job_types.iter().any(|t| t.value == template.job_type) {
            return Err(OpsError::validation(format!(
                "unknown job type '{}'",
                template.job_type
            )));
        }

        let scope_owner = if template.is_global {
            None
        } else {
            template.owner_id
        };
        if self
            .repo
            .name_exists(&template.name, scope_owner, None)
            .await?
        {
            return Err(OpsError::duplicate_name(&template.name));
        }

        let normalized = NewJobTemplate {
            owner_id: scope_owner,
            ..template
        };
        let created = self.repo.create(normalized).await?;
        info!(id = created.id, name = %created.name, "created job template");
        Ok(created)
    }

    pub async fn get_by_id(&self, id: i64) -> OpsResult<Option<JobTemplate>> {
        self.repo.find_by_id(id).await
    }

    pub async fn get_by_name(
        &self,
        name: &str,
        owner_id: Option<i64>,
    ) -> OpsResult<Option<JobTemplate>> {
        self.repo.find_by_name(name, owner_id).await
    }

    /// With an owner: global templates plus that owner's private ones.
    /// Without: global only.
    pub async fn list(
        &self,
        owner_id: Option<i64>,
        job_type: Option<&str>,
    ) -> OpsResult<Vec<JobTemplate>> {
        self.repo.list(owner_id, job_type).await
    }

    /// Applies a partial update. Name uniqueness is re-checked against the
    /// *target* scope whenever the name or the scope changes. Flipping
    /// `is_global` to true clears the owner; flipping it to false adopts the
    /// supplied `owner_id`.
    pub async fn update(
        &self,
        id: i64,
        fields: JobTemplateUpdate,
    ) -> OpsResult<Option<JobTemplate>> {
        let Some(current) = self.repo.find_by_id(id).await? else {
            return Ok(None);
        };

        let target_global = fields.is_global.unwrap_or(current.is_global);
        let target_owner = if target_global {
            None
        } else {
            fields.owner_id.or(current.owner_id)
        };
        if !target_global && target_owner.is_none() {
            return Err(OpsError::validation(
                "making a template private requires an owner_id",
            ));
        }

        let scope_changed =
            target_global != current.is_global || target_owner != current.owner_id;
        if fields.name.is_some() || scope_changed {
            let effective_name = fields.name.as_deref().unwrap_or(&current.name);
            if self
                .repo
                .name_exists(effective_name, target_owner, Some(id))
                .await?
            {
                return Err(OpsError::duplicate_name(effective_name));
            }
        }

        let normalized = JobTemplateUpdate {
            owner_id: if target_global { None } else { target_owner },
            is_global: Some(target_global),
            ..fields
        };
        let updated = self.repo.update(id, normalized).await?;
        if let Some(template) = &updated {
            info!(id, name = %template.name, "updated job template");
        }
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> OpsResult<bool> {
        let deleted = self.repo.delete(id).await?;
        if deleted {
            info!(id, "deleted job template");
        }
        Ok(deleted)
    }

    /// Registered job types with display metadata.
    pub fn job_types(&self) -> &[JobTypeInfo] {
        &self.job_types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeRepo {
        templates: Mutex<Vec<JobTemplate>>,
        next_id: AtomicI64,
    }

    fn scoped(template: &JobTemplate, owner_id: Option<i64>) -> bool {
        match owner_id {
            None => template.is_global,
            Some(owner) => template.owner_id == Some(owner),
        }
    }

    #[async_trait]
    impl JobTemplateRepository for FakeRepo {
        async fn create(&self, template: NewJobTemplate) -> opsboard_core::OpsResult<JobTemplate> {
            let now = Utc::now();
            let created = JobTemplate {
                id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
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

        async fn find_by_id(&self, id: i64) -> opsboard_core::OpsResult<Option<JobTemplate>> {
            Ok(self
                .templates
                .lock()
                .unwrap()
                .iter()
                .find(|t| t.id == id)
                .cloned())
        }

        async fn find_by_name(
            &self,
            name: &str,
            owner_id: Option<i64>,
        ) -> opsboard_core::OpsResult<Option<JobTemplate>> {
            Ok(self
                .templates
                .lock()
                .unwrap()
                .iter()
                .find(|t| t.name == name && scoped(t, owner_id))
                .cloned())
        }

        async fn list(
            &self,
            owner_id: Option<i64>,
            job_type: Option<&str>,
        ) -> opsboard_core::OpsResult<Vec<JobTemplate>> {
            Ok(self
                .templates
                .lock()
                .unwrap()
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
        ) -> opsboard_core::OpsResult<bool> {
            Ok(self.templates.lock().unwrap().iter().any(|t| {
                t.name == name && scoped(t, owner_id) && Some(t.id) != exclude_id
            }))
        }

        async fn update(
            &self,
            id: i64,
            fields: JobTemplateUpdate,
        ) -> opsboard_core::OpsResult<Option<JobTemplate>> {
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

        async fn delete(&self, id: i64) -> opsboard_core::OpsResult<bool> {
            let mut templates = self.templates.lock().unwrap();
            let before = templates.len();
            templates.retain(|t| t.id != id);
            Ok(templates.len() < before)
        }
    }

    fn service() -> JobTemplateService {
        JobTemplateService::new(
            Arc::new(FakeRepo::default()),
            vec![JobTypeInfo::new("device.backup", "Device Backup", "")],
        )
    }

    fn global(name: &str) -> NewJobTemplate {
        NewJobTemplate {
            name: name.to_string(),
            job_type: "device.backup".to_string(),
            description: None,
            is_global: true,
            owner_id: None,
            created_by: "alice".to_string(),
        }
    }

    fn private(name: &str, owner_id: i64) -> NewJobTemplate {
        NewJobTemplate {
            is_global: false,
            owner_id: Some(owner_id),
            ..global(name)
        }
    }

    #[tokio::test]
    async fn duplicate_name_rejected_within_scope_only() {
        let service = service();
        service.create(global("nightly")).await.unwrap();

        let err = service.create(global("nightly")).await.unwrap_err();
        assert!(matches!(err, OpsError::DuplicateName { .. }));

        // same name in two different scopes is fine
        service.create(private("nightly", 1)).await.unwrap();
        service.create(private("nightly", 2)).await.unwrap();
        let err = service.create(private("nightly", 2)).await.unwrap_err();
        assert!(matches!(err, OpsError::DuplicateName { .. }));
    }

    #[tokio::test]
    async fn private_template_requires_owner() {
        let service = service();
        let mut template = global("orphan");
        template.is_global = false;
        assert!(matches!(
            service.create(template).await.unwrap_err(),
            OpsError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn create_normalizes_owner_for_global_templates() {
        let service = service();
        let mut template = global("wide");
        template.owner_id = Some(9);
        let created = service.create(template).await.unwrap();
        assert!(created.is_global);
        assert_eq!(created.owner_id, None);
    }

    #[tokio::test]
    async fn rename_into_occupied_scope_conflicts() {
        let service = service();
        service.create(global("alpha")).await.unwrap();
        let beta = service.create(global("beta")).await.unwrap();

        let err = service
            .update(
                beta.id,
                JobTemplateUpdate {
                    name: Some("alpha".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::DuplicateName { .. }));

        // renaming to itself is allowed (exclude_id)
        let unchanged = service
            .update(
                beta.id,
                JobTemplateUpdate {
                    name: Some("beta".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unchanged.name, "beta");
    }

    #[tokio::test]
    async fn scope_change_rechecks_uniqueness_in_target_scope() {
        let service = service();
        service.create(global("shared")).await.unwrap();
        let mine = service.create(private("shared", 5)).await.unwrap();

        // moving the private template into the global scope collides
        let err = service
            .update(
                mine.id,
                JobTemplateUpdate {
                    is_global: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::DuplicateName { .. }));

        // moving it to another owner's empty scope succeeds and keeps it private
        let moved = service
            .update(
                mine.id,
                JobTemplateUpdate {
                    owner_id: Some(6),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(moved.owner_id, Some(6));
        assert!(!moved.is_global);
    }

    #[tokio::test]
    async fn unknown_job_type_rejected() {
        let service = service();
        let mut template = global("bad-type");
        template.job_type = "nope".to_string();
        assert!(matches!(
            service.create(template).await.unwrap_err(),
            OpsError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn update_missing_template_is_none() {
        let service = service();
        let updated = service
            .update(42, JobTemplateUpdate::default())
            .await
            .unwrap();
        assert!(updated.is_none());
    }
}
