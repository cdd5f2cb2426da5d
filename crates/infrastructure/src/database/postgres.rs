//! Postgres repositories, using runtime-checked sqlx queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::info;

use opsboard_core::config::DatabaseConfig;
use opsboard_core::models::ExecutionResult;
use opsboard_core::OpsResult;
use opsboard_domain::entities::{JobSchedule, JobTemplate, JobTemplateUpdate, NewJobTemplate};
use opsboard_domain::repositories::{JobRunSink, JobTemplateRepository, ScheduleStore};

pub async fn connect_pool(config: &DatabaseConfig) -> OpsResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;
    info!(max_connections = config.max_connections, "database pool ready");
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> OpsResult<()> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(|e| opsboard_core::OpsError::Database(e.into()))?;
    Ok(())
}

#[derive(FromRow)]
struct TemplateRow {
    id: i64,
    name: String,
    job_type: String,
    description: Option<String>,
    is_global: bool,
    owner_id: Option<i64>,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TemplateRow> for JobTemplate {
    fn from(row: TemplateRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            job_type: row.job_type,
            description: row.description,
            is_global: row.is_global,
            owner_id: row.owner_id,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const TEMPLATE_COLUMNS: &str =
    "id, name, job_type, description, is_global, owner_id, created_by, created_at, updated_at";

pub struct PostgresTemplateRepository {
    pool: PgPool,
}

impl PostgresTemplateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobTemplateRepository for PostgresTemplateRepository {
    async fn create(&self, template: NewJobTemplate) -> OpsResult<JobTemplate> {
        let sql = format!(
            "INSERT INTO job_templates \
             (name, job_type, description, is_global, owner_id, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {TEMPLATE_COLUMNS}"
        );
        let row: TemplateRow = sqlx::query_as(&sql)
            .bind(&template.name)
            .bind(&template.job_type)
            .bind(&template.description)
            .bind(template.is_global)
            .bind(template.owner_id)
            .bind(&template.created_by)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn find_by_id(&self, id: i64) -> OpsResult<Option<JobTemplate>> {
        let sql = format!("SELECT {TEMPLATE_COLUMNS} FROM job_templates WHERE id = $1");
        let row: Option<TemplateRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn find_by_name(
        &self,
        name: &str,
        owner_id: Option<i64>,
    ) -> OpsResult<Option<JobTemplate>> {
        let sql = format!(
            "SELECT {TEMPLATE_COLUMNS} FROM job_templates \
             WHERE name = $1 \
               AND (($2::bigint IS NULL AND is_global) OR owner_id = $2)"
        );
        let row: Option<TemplateRow> = sqlx::query_as(&sql)
            .bind(name)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn list(
        &self,
        owner_id: Option<i64>,
        job_type: Option<&str>,
    ) -> OpsResult<Vec<JobTemplate>> {
        let sql = format!(
            "SELECT {TEMPLATE_COLUMNS} FROM job_templates \
             WHERE (is_global OR ($1::bigint IS NOT NULL AND owner_id = $1)) \
               AND ($2::text IS NULL OR job_type = $2) \
             ORDER BY id"
        );
        let rows: Vec<TemplateRow> = sqlx::query_as(&sql)
            .bind(owner_id)
            .bind(job_type)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn name_exists(
        &self,
        name: &str,
        owner_id: Option<i64>,
        exclude_id: Option<i64>,
    ) -> OpsResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS( \
               SELECT 1 FROM job_templates \
               WHERE name = $1 \
                 AND (($2::bigint IS NULL AND is_global) OR owner_id = $2) \
                 AND ($3::bigint IS NULL OR id <> $3))",
        )
        .bind(name)
        .bind(owner_id)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn update(&self, id: i64, fields: JobTemplateUpdate) -> OpsResult<Option<JobTemplate>> {
        let sql = format!(
            "UPDATE job_templates SET \
               name = COALESCE($2, name), \
               description = COALESCE($3, description), \
               is_global = COALESCE($4, is_global), \
               owner_id = CASE WHEN $4::boolean IS NOT NULL THEN $5 ELSE owner_id END, \
               updated_at = now() \
             WHERE id = $1 \
             RETURNING {TEMPLATE_COLUMNS}"
        );
        let row: Option<TemplateRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(&fields.name)
            .bind(&fields.description)
            .bind(fields.is_global)
            .bind(fields.owner_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn delete(&self, id: i64) -> OpsResult<bool> {
        let result = sqlx::query("DELETE FROM job_templates WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(FromRow)]
struct ScheduleRow {
    id: i64,
    job_type: String,
    cron_expr: String,
    credential_id: Option<i64>,
    target_devices: Json<Vec<String>>,
    job_parameters: Json<serde_json::Value>,
    template_id: Option<i64>,
    next_run: Option<DateTime<Utc>>,
}

impl From<ScheduleRow> for JobSchedule {
    fn from(row: ScheduleRow) -> Self {
        Self {
            id: row.id,
            job_type: row.job_type,
            cron_expr: row.cron_expr,
            credential_id: row.credential_id,
            target_devices: row.target_devices.0,
            job_parameters: row.job_parameters.0,
            template_id: row.template_id,
            next_run: row.next_run,
        }
    }
}

pub struct PostgresScheduleStore {
    pool: PgPool,
}

impl PostgresScheduleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleStore for PostgresScheduleStore {
    async fn list(&self) -> OpsResult<Vec<JobSchedule>> {
        let rows: Vec<ScheduleRow> = sqlx::query_as(
            "SELECT id, job_type, cron_expr, credential_id, target_devices, \
                    job_parameters, template_id, next_run \
             FROM job_schedules ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn set_next_run(&self, id: i64, next_run: DateTime<Utc>) -> OpsResult<()> {
        sqlx::query("UPDATE job_schedules SET next_run = $2 WHERE id = $1")
            .bind(id)
            .bind(next_run)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct PostgresJobRunSink {
    pool: PgPool,
}

impl PostgresJobRunSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRunSink for PostgresJobRunSink {
    async fn record_completion(
        &self,
        job_run_id: i64,
        result: &ExecutionResult,
    ) -> OpsResult<()> {
        let status = if result.success { "success" } else { "failed" };
        sqlx::query(
            "UPDATE job_runs \
             SET status = $2, result = $3, finished_at = now() \
             WHERE id = $1",
        )
        .bind(job_run_id)
        .bind(status)
        .bind(Json(serde_json::to_value(result)?))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
