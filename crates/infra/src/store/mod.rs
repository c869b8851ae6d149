//! Job and task record stores.
//!
//! The engine persists every state change through these traits. Records are
//! cloned in and out so callers never hold a store lock across an await.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use taskmill_core::{JobId, TaskId};
use taskmill_jobs::{Job, JobStatus, JobType, Task, TaskStatus};

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

/// Record store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    JobNotFound(JobId),
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("record already exists: {0}")]
    AlreadyExists(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Filter and window for [`JobRecordStore::list_jobs`].
#[derive(Debug, Clone, Default)]
pub struct JobQuery {
    /// Case-insensitive substring match on the job id or job type.
    pub search: Option<String>,
    pub status: Option<JobStatus>,
    pub offset: usize,
    pub limit: usize,
}

impl JobQuery {
    pub fn matches(&self, job: &Job) -> bool {
        if let Some(status) = self.status {
            if job.status != status {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                job.id.to_string().contains(&needle)
                    || job.job_type.as_str().to_lowercase().contains(&needle)
            }
        }
    }
}

/// One page of jobs plus the size of the whole filtered set.
#[derive(Debug, Clone, Default)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub total: usize,
}

/// Narrow job projection consumed by analytics.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSummary {
    pub job_type: JobType,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            job_type: job.job_type.clone(),
            status: job.status,
            created_at: job.created_at,
        }
    }
}

/// Narrow task projection consumed by analytics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskSummary {
    pub status: TaskStatus,
    pub processing_time_seconds: Option<f64>,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            status: task.status,
            processing_time_seconds: task.processing_time_seconds,
        }
    }
}

/// Job record persistence.
#[async_trait]
pub trait JobRecordStore: Send + Sync {
    async fn insert_job(&self, job: &Job) -> Result<(), StoreError>;

    async fn get_job(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// Replace an existing job record.
    async fn update_job(&self, job: &Job) -> Result<(), StoreError>;

    /// Filtered page of jobs, newest first.
    async fn list_jobs(&self, query: &JobQuery) -> Result<JobPage, StoreError>;

    async fn job_summaries(&self) -> Result<Vec<JobSummary>, StoreError>;

    /// Most recently created jobs, newest first.
    async fn recent_jobs(&self, limit: usize) -> Result<Vec<Job>, StoreError>;
}

/// Task record persistence.
#[async_trait]
pub trait TaskRecordStore: Send + Sync {
    async fn insert_task(&self, task: &Task) -> Result<(), StoreError>;

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    /// Replace an existing task record.
    async fn update_task(&self, task: &Task) -> Result<(), StoreError>;

    /// All tasks of a job ordered by `task_index`.
    async fn list_tasks_for_job(&self, job_id: JobId) -> Result<Vec<Task>, StoreError>;

    async fn task_summaries(&self) -> Result<Vec<TaskSummary>, StoreError>;
}

/// Both record stores behind one handle.
pub trait RecordStore: JobRecordStore + TaskRecordStore {}

impl<T: JobRecordStore + TaskRecordStore> RecordStore for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_matches_id_prefix_and_type_case_insensitively() {
        let job = Job::new(JobType::MlInference, 1, None);
        let by_type = JobQuery {
            search: Some("ML_inf".to_string()),
            ..Default::default()
        };
        assert!(by_type.matches(&job));

        let prefix: String = job.id.to_string().chars().take(8).collect();
        let by_id = JobQuery {
            search: Some(prefix.to_uppercase()),
            ..Default::default()
        };
        assert!(by_id.matches(&job));

        let by_status = JobQuery {
            status: Some(JobStatus::Running),
            ..Default::default()
        };
        assert!(!by_status.matches(&job));
    }
}
