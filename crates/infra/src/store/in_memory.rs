//! In-memory record store for tests and single-process deployments.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use taskmill_core::{Entity, JobId, TaskId};
use taskmill_jobs::{Job, Task};

use super::{
    JobPage, JobQuery, JobRecordStore, JobSummary, StoreError, TaskRecordStore, TaskSummary,
};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn jobs(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, Job>>, StoreError> {
        self.jobs.read().map_err(|_| poisoned("jobs"))
    }

    fn jobs_mut(&self) -> Result<RwLockWriteGuard<'_, HashMap<JobId, Job>>, StoreError> {
        self.jobs.write().map_err(|_| poisoned("jobs"))
    }

    fn tasks(&self) -> Result<RwLockReadGuard<'_, HashMap<TaskId, Task>>, StoreError> {
        self.tasks.read().map_err(|_| poisoned("tasks"))
    }

    fn tasks_mut(&self) -> Result<RwLockWriteGuard<'_, HashMap<TaskId, Task>>, StoreError> {
        self.tasks.write().map_err(|_| poisoned("tasks"))
    }

    fn newest_first(&self) -> Result<Vec<Job>, StoreError> {
        let mut jobs: Vec<Job> = self.jobs()?.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(jobs)
    }
}

/// Insert a record keyed by its entity id, refusing duplicates.
fn insert_new<E>(table: &mut HashMap<E::Id, E>, record: &E) -> Result<(), StoreError>
where
    E: Entity + Clone,
    E::Id: std::fmt::Display,
{
    if table.contains_key(record.id()) {
        return Err(StoreError::AlreadyExists(record.id().to_string()));
    }
    table.insert(record.id().clone(), record.clone());
    Ok(())
}

fn poisoned(table: &str) -> StoreError {
    StoreError::Storage(format!("{table} lock poisoned"))
}

#[async_trait]
impl JobRecordStore for InMemoryStore {
    async fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs_mut()?;
        insert_new(&mut *jobs, job)
    }

    async fn get_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs()?.get(&id).cloned())
    }

    async fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs_mut()?;
        match jobs.get_mut(&job.id) {
            Some(slot) => {
                *slot = job.clone();
                Ok(())
            }
            None => Err(StoreError::JobNotFound(job.id)),
        }
    }

    async fn list_jobs(&self, query: &JobQuery) -> Result<JobPage, StoreError> {
        let filtered: Vec<Job> = self
            .newest_first()?
            .into_iter()
            .filter(|job| query.matches(job))
            .collect();
        let total = filtered.len();
        let jobs = filtered
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect();
        Ok(JobPage { jobs, total })
    }

    async fn job_summaries(&self) -> Result<Vec<JobSummary>, StoreError> {
        Ok(self.jobs()?.values().map(JobSummary::from).collect())
    }

    async fn recent_jobs(&self, limit: usize) -> Result<Vec<Job>, StoreError> {
        let mut jobs = self.newest_first()?;
        jobs.truncate(limit);
        Ok(jobs)
    }
}

#[async_trait]
impl TaskRecordStore for InMemoryStore {
    async fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks_mut()?;
        insert_new(&mut *tasks, task)
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks()?.get(&id).cloned())
    }

    async fn update_task(&self, task: &Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks_mut()?;
        match tasks.get_mut(&task.id) {
            Some(slot) => {
                *slot = task.clone();
                Ok(())
            }
            None => Err(StoreError::TaskNotFound(task.id)),
        }
    }

    async fn list_tasks_for_job(&self, job_id: JobId) -> Result<Vec<Task>, StoreError> {
        let mut tasks: Vec<Task> = self
            .tasks()?
            .values()
            .filter(|t| t.job_id == job_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.task_index);
        Ok(tasks)
    }

    async fn task_summaries(&self) -> Result<Vec<TaskSummary>, StoreError> {
        Ok(self.tasks()?.values().map(TaskSummary::from).collect())
    }
}
