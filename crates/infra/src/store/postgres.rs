//! Postgres-backed record store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | Database, unique violation (`23505`) | `AlreadyExists` |
//! | Database (other) | `Storage` |
//! | PoolClosed / network / decode | `Storage` |
//!
//! Counters and indexes are stored as `INTEGER`; they are bounded by the
//! fan-out limit so the `u32 ↔ i32` casts never truncate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use async_trait::async_trait;
use taskmill_core::{JobId, TaskId};
use taskmill_jobs::{Job, JobType, Task};

use super::{
    JobPage, JobQuery, JobRecordStore, JobSummary, StoreError, TaskRecordStore, TaskSummary,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id              UUID PRIMARY KEY,
    job_type        TEXT NOT NULL,
    status          TEXT NOT NULL,
    total_tasks     INTEGER NOT NULL,
    completed_tasks INTEGER NOT NULL DEFAULT 0,
    failed_tasks    INTEGER NOT NULL DEFAULT 0,
    parameters      JSONB,
    created_at      TIMESTAMPTZ NOT NULL,
    updated_at      TIMESTAMPTZ NOT NULL,
    started_at      TIMESTAMPTZ,
    completed_at    TIMESTAMPTZ,
    error_message   TEXT,
    first_failure   TEXT,
    CHECK (completed_tasks + failed_tasks <= total_tasks)
);

CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs (created_at DESC);
CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs (status);

CREATE TABLE IF NOT EXISTS tasks (
    id                      UUID PRIMARY KEY,
    job_id                  UUID NOT NULL REFERENCES jobs (id),
    task_index              INTEGER NOT NULL,
    status                  TEXT NOT NULL,
    retry_count             INTEGER NOT NULL DEFAULT 0,
    max_retries             INTEGER NOT NULL,
    parameters              JSONB NOT NULL,
    result                  JSONB,
    error_message           TEXT,
    created_at              TIMESTAMPTZ NOT NULL,
    updated_at              TIMESTAMPTZ NOT NULL,
    started_at              TIMESTAMPTZ,
    completed_at            TIMESTAMPTZ,
    processing_time_seconds DOUBLE PRECISION,
    UNIQUE (job_id, task_index)
);

CREATE INDEX IF NOT EXISTS idx_tasks_job_id ON tasks (job_id);
"#;

const JOB_COLUMNS: &str = "id, job_type, status, total_tasks, completed_tasks, failed_tasks, \
     parameters, created_at, updated_at, started_at, completed_at, error_message, first_failure";

const TASK_COLUMNS: &str = "id, job_id, task_index, status, retry_count, max_retries, parameters, \
     result, error_message, created_at, updated_at, started_at, completed_at, processing_time_seconds";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect and bootstrap the schema.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Create tables and indexes when missing.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait]
impl JobRecordStore for PostgresStore {
    #[instrument(skip(self, job), fields(job_id = %job.id), err)]
    async fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO jobs ({JOB_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        ))
        .bind(job.id.as_uuid())
        .bind(job.job_type.as_str())
        .bind(job.status.as_str())
        .bind(job.total_tasks as i32)
        .bind(job.completed_tasks as i32)
        .bind(job.failed_tasks as i32)
        .bind(&job.parameters)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.error_message)
        .bind(&job.first_failure)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_job", e))?;
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_job", e))?;
        row.as_ref().map(job_from_row).transpose()
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, status = %job.status), err)]
    async fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET
                status = $2,
                completed_tasks = $3,
                failed_tasks = $4,
                updated_at = $5,
                started_at = $6,
                completed_at = $7,
                error_message = $8,
                first_failure = $9
            WHERE id = $1
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.status.as_str())
        .bind(job.completed_tasks as i32)
        .bind(job.failed_tasks as i32)
        .bind(job.updated_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.error_message)
        .bind(&job.first_failure)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_job", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::JobNotFound(job.id));
        }
        Ok(())
    }

    async fn list_jobs(&self, query: &JobQuery) -> Result<JobPage, StoreError> {
        let pattern = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", escape_like(s)));
        let status = query.status.map(|s| s.as_str());

        const FILTER: &str = "($1::text IS NULL OR id::text ILIKE $1 OR job_type ILIKE $1) \
             AND ($2::text IS NULL OR status = $2)";

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM jobs WHERE {FILTER}"))
            .bind(&pattern)
            .bind(status)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_jobs", e))?;

        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE {FILTER} \
             ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4"
        ))
        .bind(&pattern)
        .bind(status)
        .bind(query.limit as i64)
        .bind(query.offset as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_jobs", e))?;

        let jobs = rows.iter().map(job_from_row).collect::<Result<_, _>>()?;
        Ok(JobPage {
            jobs,
            total: total as usize,
        })
    }

    async fn job_summaries(&self) -> Result<Vec<JobSummary>, StoreError> {
        let rows = sqlx::query("SELECT job_type, status, created_at FROM jobs")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("job_summaries", e))?;

        rows.iter()
            .map(|row| {
                Ok(JobSummary {
                    job_type: JobType::from(get::<String>(row, "job_type")?),
                    status: parse_status(&get::<String>(row, "status")?)?,
                    created_at: get(row, "created_at")?,
                })
            })
            .collect()
    }

    async fn recent_jobs(&self, limit: usize) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC, id DESC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("recent_jobs", e))?;
        rows.iter().map(job_from_row).collect()
    }
}

#[async_trait]
impl TaskRecordStore for PostgresStore {
    #[instrument(skip(self, task), fields(task_id = %task.id, job_id = %task.job_id), err)]
    async fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO tasks ({TASK_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        ))
        .bind(task.id.as_uuid())
        .bind(task.job_id.as_uuid())
        .bind(task.task_index as i32)
        .bind(task.status.as_str())
        .bind(task.retry_count as i32)
        .bind(task.max_retries as i32)
        .bind(&task.parameters)
        .bind(&task.result)
        .bind(&task.error_message)
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(task.started_at)
        .bind(task.completed_at)
        .bind(task.processing_time_seconds)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_task", e))?;
        Ok(())
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_task", e))?;
        row.as_ref().map(task_from_row).transpose()
    }

    #[instrument(skip(self, task), fields(task_id = %task.id, status = %task.status), err)]
    async fn update_task(&self, task: &Task) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE tasks SET
                status = $2,
                retry_count = $3,
                result = $4,
                error_message = $5,
                updated_at = $6,
                started_at = $7,
                completed_at = $8,
                processing_time_seconds = $9
            WHERE id = $1
            "#,
        )
        .bind(task.id.as_uuid())
        .bind(task.status.as_str())
        .bind(task.retry_count as i32)
        .bind(&task.result)
        .bind(&task.error_message)
        .bind(task.updated_at)
        .bind(task.started_at)
        .bind(task.completed_at)
        .bind(task.processing_time_seconds)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_task", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::TaskNotFound(task.id));
        }
        Ok(())
    }

    async fn list_tasks_for_job(&self, job_id: JobId) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE job_id = $1 ORDER BY task_index ASC"
        ))
        .bind(job_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_tasks_for_job", e))?;
        rows.iter().map(task_from_row).collect()
    }

    async fn task_summaries(&self) -> Result<Vec<TaskSummary>, StoreError> {
        let rows = sqlx::query("SELECT status, processing_time_seconds FROM tasks")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("task_summaries", e))?;

        rows.iter()
            .map(|row| {
                Ok(TaskSummary {
                    status: parse_status(&get::<String>(row, "status")?)?,
                    processing_time_seconds: get(row, "processing_time_seconds")?,
                })
            })
            .collect()
    }
}

fn job_from_row(row: &PgRow) -> Result<Job, StoreError> {
    Ok(Job {
        id: JobId::from_uuid(get(row, "id")?),
        job_type: JobType::from(get::<String>(row, "job_type")?),
        status: parse_status(&get::<String>(row, "status")?)?,
        total_tasks: get::<i32>(row, "total_tasks")? as u32,
        completed_tasks: get::<i32>(row, "completed_tasks")? as u32,
        failed_tasks: get::<i32>(row, "failed_tasks")? as u32,
        parameters: get(row, "parameters")?,
        created_at: get::<DateTime<Utc>>(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
        started_at: get(row, "started_at")?,
        completed_at: get(row, "completed_at")?,
        error_message: get(row, "error_message")?,
        first_failure: get(row, "first_failure")?,
    })
}

fn task_from_row(row: &PgRow) -> Result<Task, StoreError> {
    Ok(Task {
        id: TaskId::from_uuid(get(row, "id")?),
        job_id: JobId::from_uuid(get(row, "job_id")?),
        task_index: get::<i32>(row, "task_index")? as u32,
        status: parse_status(&get::<String>(row, "status")?)?,
        retry_count: get::<i32>(row, "retry_count")? as u32,
        max_retries: get::<i32>(row, "max_retries")? as u32,
        parameters: get(row, "parameters")?,
        result: get(row, "result")?,
        error_message: get(row, "error_message")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
        started_at: get(row, "started_at")?,
        completed_at: get(row, "completed_at")?,
        processing_time_seconds: get(row, "processing_time_seconds")?,
    })
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Storage(format!("failed to decode column {column}: {e}")))
}

fn parse_status<S>(raw: &str) -> Result<S, StoreError>
where
    S: std::str::FromStr<Err = taskmill_core::DomainError>,
{
    raw.parse()
        .map_err(|e: taskmill_core::DomainError| StoreError::Storage(e.to_string()))
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::AlreadyExists(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("ml_inf%"), "ml\\_inf\\%");
    }
}
