//! Job manager: fan-out, per-job state transitions and record lookups.
//!
//! Every transition that touches a job's visible state (task start, terminal
//! task outcome, retry re-enqueue, cancel, fan-out) runs under that job's
//! async mutex, so each job has a single writer. Queue pushes always happen
//! after the lock is released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::{debug, error, info, warn};

use taskmill_core::{DomainError, JobId, TaskId};
use taskmill_jobs::{
    validate_num_tasks, Job, JobStatus, JobType, Task, TaskOutcome, TaskStatus, WorkloadSpec,
};

use crate::error::{EngineError, EngineResult};
use crate::queue::{QueueEntry, TaskQueue};
use crate::store::{JobQuery, RecordStore};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Validated 1-based page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Pagination {
    pub fn new(page: Option<i64>, page_size: Option<i64>) -> Result<Self, DomainError> {
        let page = page.unwrap_or(1);
        let page_size = page_size.unwrap_or(i64::from(DEFAULT_PAGE_SIZE));
        if page < 1 || page > i64::from(u32::MAX) {
            return Err(DomainError::validation(format!("page must be >= 1, got {page}")));
        }
        if !(1..=i64::from(MAX_PAGE_SIZE)).contains(&page_size) {
            return Err(DomainError::validation(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}, got {page_size}"
            )));
        }
        Ok(Self {
            page: page as u32,
            page_size: page_size as u32,
        })
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.page_size as usize
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// One page of the job list.
#[derive(Debug, Clone)]
pub struct JobListing {
    pub jobs: Vec<Job>,
    pub total: usize,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub search: Option<String>,
    pub status: Option<JobStatus>,
}

pub struct JobManager {
    store: Arc<dyn RecordStore>,
    queue: TaskQueue,
    default_max_retries: u32,
    locks: Mutex<HashMap<JobId, Arc<tokio::sync::Mutex<()>>>>,
}

impl JobManager {
    pub fn new(store: Arc<dyn RecordStore>, queue: TaskQueue, default_max_retries: u32) -> Self {
        Self {
            store,
            queue,
            default_max_retries,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    fn lock_for(&self, job_id: JobId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(job_id).or_default().clone()
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Drop the lock of a terminal job. Later writes are task-local only.
    fn forget_lock(&self, job_id: JobId) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.remove(&job_id);
    }

    /// Validate a submission, persist the job and its tasks, and enqueue them.
    pub async fn submit(
        &self,
        job_type: &str,
        num_tasks: i64,
        parameters: Option<Value>,
    ) -> EngineResult<Job> {
        let job_type = JobType::parse(job_type)?;
        let total = validate_num_tasks(num_tasks)?;
        let workload = WorkloadSpec::from_parameters(parameters.as_ref())?;
        let parameters = parameters.filter(|p| !p.is_null());
        let max_retries = workload.max_retries.unwrap_or(self.default_max_retries);
        let task_parameters = workload.task_parameters(parameters.as_ref());

        let mut job = Job::new(job_type, total, parameters);
        self.store.insert_job(&job).await?;
        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            total_tasks = total,
            "job submitted"
        );

        let entries = {
            let lock = self.lock_for(job.id);
            let _guard = lock.lock().await;

            job.begin_fan_out()?;
            let mut tasks = Vec::with_capacity(total as usize);
            if let Err(cause) = self
                .fan_out(&mut job, max_retries, &task_parameters, &mut tasks)
                .await
            {
                let err = self.abort_fan_out(&mut job, &mut tasks, cause).await;
                self.forget_lock(job.id);
                return Err(err);
            }

            tasks
                .iter()
                .map(|task| QueueEntry {
                    task_id: task.id,
                    job_id: job.id,
                })
                .collect::<Vec<_>>()
        };

        for entry in entries {
            self.queue.enqueue(entry).await?;
        }
        debug!(job_id = %job.id, queue_depth = self.queue.depth(), "job tasks enqueued");
        Ok(job)
    }

    async fn fan_out(
        &self,
        job: &mut Job,
        max_retries: u32,
        task_parameters: &Value,
        tasks: &mut Vec<Task>,
    ) -> EngineResult<()> {
        self.store.update_job(job).await?;

        for index in 0..job.total_tasks {
            let task = Task::new(job.id, index, max_retries, task_parameters.clone());
            self.store.insert_task(&task).await?;
            tasks.push(task);
        }

        for task in tasks.iter_mut() {
            task.mark_enqueued()?;
            self.store.update_task(task).await?;
        }

        let mut enqueued = job.clone();
        enqueued.mark_enqueued()?;
        self.store.update_job(&enqueued).await?;
        *job = enqueued;
        Ok(())
    }

    /// Cancel whatever the interrupted fan-out created and fail the job.
    async fn abort_fan_out(
        &self,
        job: &mut Job,
        tasks: &mut [Task],
        cause: EngineError,
    ) -> EngineError {
        let created = tasks.len() as u32;
        let requested = job.total_tasks;
        warn!(
            job_id = %job.id,
            created,
            requested,
            error = %cause,
            "task creation failed; cancelling created tasks"
        );

        for task in tasks.iter_mut() {
            if task.mark_cancelled().is_ok() {
                if let Err(e) = self.store.update_task(task).await {
                    error!(task_id = %task.id, error = %e, "failed to cancel task");
                }
            }
        }

        let message = format!("task creation failed after {created} of {requested} tasks: {cause}");
        if job.fail_creation(message).is_ok() {
            if let Err(e) = self.store.update_job(job).await {
                error!(job_id = %job.id, error = %e, "failed to mark job as failed");
            }
        }

        EngineError::PartialCreation {
            job_id: job.id,
            created,
            requested,
            reason: cause.to_string(),
        }
    }

    /// Move a dequeued task to RUNNING.
    ///
    /// Returns `None` when the entry is stale (task no longer ENQUEUED) or the
    /// job already finished, in which case the task is cancelled. When the
    /// store rejects the start, the task is still ENQUEUED in the store and
    /// its entry goes back on the queue.
    pub async fn begin_task(&self, entry: QueueEntry) -> EngineResult<Option<Task>> {
        let started = {
            let lock = self.lock_for(entry.job_id);
            let _guard = lock.lock().await;
            self.start_locked(entry).await
        };

        if let Err(EngineError::Persistence(e)) = &started {
            warn!(task_id = %entry.task_id, error = %e, "task start not persisted; re-enqueueing");
            let queue = self.queue.clone();
            tokio::spawn(async move {
                if let Err(e) = queue.enqueue(entry).await {
                    warn!(task_id = %entry.task_id, error = %e, "re-enqueue after failed start dropped");
                }
            });
        }
        started
    }

    async fn start_locked(&self, entry: QueueEntry) -> EngineResult<Option<Task>> {
        let Some(mut task) = self.store.get_task(entry.task_id).await? else {
            warn!(task_id = %entry.task_id, "dequeued unknown task");
            return Ok(None);
        };
        let mut job = self.require_job(task.job_id).await?;
        if task.status != TaskStatus::Enqueued {
            debug!(task_id = %task.id, status = %task.status, "skipping stale queue entry");
            if job.is_terminal() {
                self.forget_lock(job.id);
            }
            return Ok(None);
        }
        if job.is_terminal() {
            task.mark_cancelled()?;
            self.store.update_task(&task).await?;
            self.forget_lock(job.id);
            debug!(task_id = %task.id, job_status = %job.status, "task of finished job cancelled");
            return Ok(None);
        }

        // Job first: a task is only RUNNING in the store once its job is.
        if job.mark_started() {
            self.store.update_job(&job).await?;
            info!(job_id = %job.id, "job running");
        }
        task.mark_running()?;
        self.store.update_task(&task).await?;
        Ok(Some(task))
    }

    /// Record a task's terminal outcome and recompute the job aggregate.
    ///
    /// Returns the job's terminal status if this outcome finished it.
    pub async fn on_task_terminal(&self, task: Task) -> EngineResult<Option<JobStatus>> {
        let lock = self.lock_for(task.job_id);
        let _guard = lock.lock().await;

        self.store.update_task(&task).await?;

        let mut job = self.require_job(task.job_id).await?;
        if job.is_terminal() {
            debug!(
                job_id = %job.id,
                task_id = %task.id,
                job_status = %job.status,
                "job already finished; task outcome not counted"
            );
            self.forget_lock(job.id);
            return Ok(None);
        }

        let outcome = match task.status {
            TaskStatus::Completed => TaskOutcome::Completed,
            TaskStatus::Failed => TaskOutcome::Failed {
                reason: task
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
            },
            other => {
                return Err(DomainError::invalid_transition(format!(
                    "task {} is not terminal ({other})",
                    task.id
                ))
                .into());
            }
        };

        let finished = job.record_task_outcome(outcome)?;
        self.store.update_job(&job).await?;

        if let Some(status) = finished {
            info!(
                job_id = %job.id,
                status = %status,
                completed_tasks = job.completed_tasks,
                failed_tasks = job.failed_tasks,
                "job finished"
            );
            self.forget_lock(job.id);
        }
        Ok(finished)
    }

    /// Persist a task that just moved to RETRYING.
    ///
    /// Returns `false` (and cancels the task) when its job finished meanwhile.
    pub async fn persist_retrying(&self, task: &mut Task) -> EngineResult<bool> {
        let lock = self.lock_for(task.job_id);
        let _guard = lock.lock().await;

        let job = self.require_job(task.job_id).await?;
        if job.is_terminal() {
            task.mark_cancelled()?;
            self.store.update_task(task).await?;
            self.forget_lock(job.id);
            return Ok(false);
        }
        self.store.update_task(task).await?;
        Ok(true)
    }

    /// Put a RETRYING task back on the queue after its backoff.
    pub async fn requeue(&self, entry: QueueEntry) -> EngineResult<bool> {
        {
            let lock = self.lock_for(entry.job_id);
            let _guard = lock.lock().await;

            let mut task = self.require_task(entry.task_id).await?;
            let job = self.require_job(task.job_id).await?;
            if task.status != TaskStatus::Retrying {
                if job.is_terminal() {
                    self.forget_lock(job.id);
                }
                return Ok(false);
            }
            if job.is_terminal() {
                task.mark_cancelled()?;
                self.store.update_task(&task).await?;
                self.forget_lock(job.id);
                debug!(task_id = %task.id, "retry dropped; job already finished");
                return Ok(false);
            }
            task.mark_enqueued()?;
            self.store.update_task(&task).await?;
        }

        self.queue.enqueue(entry).await?;
        Ok(true)
    }

    /// Cancel a non-terminal job and every task that has not started.
    pub async fn cancel(&self, job_id: JobId) -> EngineResult<Job> {
        let lock = self.lock_for(job_id);
        let _guard = lock.lock().await;

        let mut job = self.require_job(job_id).await?;
        job.cancel()?;
        self.store.update_job(&job).await?;

        let mut cancelled = 0u32;
        for mut task in self.store.list_tasks_for_job(job_id).await? {
            if task.status.is_pending_like() {
                task.mark_cancelled()?;
                self.store.update_task(&task).await?;
                cancelled += 1;
            }
        }

        info!(job_id = %job.id, cancelled_tasks = cancelled, "job cancelled");
        self.forget_lock(job_id);
        Ok(job)
    }

    pub async fn get_job(&self, job_id: JobId) -> EngineResult<Job> {
        self.require_job(job_id).await
    }

    pub async fn list_jobs(&self, page: Pagination, filter: JobFilter) -> EngineResult<JobListing> {
        let query = JobQuery {
            search: filter.search,
            status: filter.status,
            offset: page.offset(),
            limit: page.page_size as usize,
        };
        let result = self.store.list_jobs(&query).await?;
        let total_pages = result.total.div_ceil(page.page_size as usize) as u32;
        Ok(JobListing {
            jobs: result.jobs,
            total: result.total,
            page: page.page,
            page_size: page.page_size,
            total_pages,
        })
    }

    /// Tasks of an existing job ordered by `task_index`.
    pub async fn list_tasks(&self, job_id: JobId) -> EngineResult<Vec<Task>> {
        self.require_job(job_id).await?;
        Ok(self.store.list_tasks_for_job(job_id).await?)
    }

    pub async fn get_task(&self, task_id: TaskId) -> EngineResult<Task> {
        self.require_task(task_id).await
    }

    async fn require_job(&self, job_id: JobId) -> EngineResult<Job> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or_else(|| EngineError::job_not_found(job_id))
    }

    async fn require_task(&self, task_id: TaskId) -> EngineResult<Task> {
        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| EngineError::task_not_found(task_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{
        InMemoryStore, JobPage, JobRecordStore, JobSummary, StoreError, TaskRecordStore,
        TaskSummary,
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn manager() -> (JobManager, TaskQueue) {
        let queue = TaskQueue::new(64);
        (JobManager::new(InMemoryStore::arc(), queue.clone(), 3), queue)
    }

    /// Store that fails the n-th task insert, and optionally the first
    /// write of a RUNNING job.
    struct FlakyStore {
        inner: InMemoryStore,
        fail_on_insert: usize,
        inserts: AtomicUsize,
        fail_running_update: AtomicBool,
    }

    impl FlakyStore {
        fn new(fail_on_insert: usize, fail_running_update: bool) -> Arc<Self> {
            Arc::new(Self {
                inner: InMemoryStore::new(),
                fail_on_insert,
                inserts: AtomicUsize::new(0),
                fail_running_update: AtomicBool::new(fail_running_update),
            })
        }
    }

    #[async_trait]
    impl JobRecordStore for FlakyStore {
        async fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
            self.inner.insert_job(job).await
        }
        async fn get_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
            self.inner.get_job(id).await
        }
        async fn update_job(&self, job: &Job) -> Result<(), StoreError> {
            if job.status == JobStatus::Running
                && self.fail_running_update.swap(false, Ordering::SeqCst)
            {
                return Err(StoreError::Storage("connection reset".to_string()));
            }
            self.inner.update_job(job).await
        }
        async fn list_jobs(&self, query: &JobQuery) -> Result<JobPage, StoreError> {
            self.inner.list_jobs(query).await
        }
        async fn job_summaries(&self) -> Result<Vec<JobSummary>, StoreError> {
            self.inner.job_summaries().await
        }
        async fn recent_jobs(&self, limit: usize) -> Result<Vec<Job>, StoreError> {
            self.inner.recent_jobs(limit).await
        }
    }

    #[async_trait]
    impl TaskRecordStore for FlakyStore {
        async fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
            let n = self.inserts.fetch_add(1, Ordering::SeqCst);
            if n == self.fail_on_insert {
                return Err(StoreError::Storage("disk full".to_string()));
            }
            self.inner.insert_task(task).await
        }
        async fn get_task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
            self.inner.get_task(id).await
        }
        async fn update_task(&self, task: &Task) -> Result<(), StoreError> {
            self.inner.update_task(task).await
        }
        async fn list_tasks_for_job(&self, job_id: JobId) -> Result<Vec<Task>, StoreError> {
            self.inner.list_tasks_for_job(job_id).await
        }
        async fn task_summaries(&self) -> Result<Vec<TaskSummary>, StoreError> {
            self.inner.task_summaries().await
        }
    }

    #[tokio::test]
    async fn submit_creates_and_enqueues_every_task() {
        let (manager, queue) = manager();
        let job = manager
            .submit("compute", 3, Some(json!({"work_type": "io_bound"})))
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Enqueued);
        assert_eq!(job.total_tasks, 3);
        assert_eq!(queue.depth(), 3);

        let tasks = manager.list_tasks(job.id).await.unwrap();
        assert_eq!(tasks.len(), 3);
        for (i, task) in tasks.iter().enumerate() {
            assert_eq!(task.task_index, i as u32);
            assert_eq!(task.status, TaskStatus::Enqueued);
            assert_eq!(task.max_retries, 3);
            assert_eq!(task.parameters["work_type"], "io_bound");
        }
    }

    #[tokio::test]
    async fn invalid_submissions_persist_nothing() {
        let (manager, queue) = manager();
        for (job_type, n, params) in [
            ("compute", 0, None),
            ("compute", 1001, None),
            ("  ", 1, None),
            ("compute", 1, Some(json!("nope"))),
            ("compute", 1, Some(json!({"work_type": "matrix_multiply", "matrix_size": 2}))),
        ] {
            let err = manager.submit(job_type, n, params).await.unwrap_err();
            assert!(matches!(err, EngineError::Domain(DomainError::Validation(_))));
        }
        let listing = manager
            .list_jobs(Pagination::default(), JobFilter::default())
            .await
            .unwrap();
        assert_eq!(listing.total, 0);
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn partial_creation_cancels_created_tasks() {
        let store = FlakyStore::new(2, false);
        let queue = TaskQueue::new(16);
        let manager = JobManager::new(store.clone(), queue.clone(), 3);

        let err = manager.submit("compute", 5, None).await.unwrap_err();
        let (job_id, created, requested) = match err {
            EngineError::PartialCreation {
                job_id,
                created,
                requested,
                ..
            } => (job_id, created, requested),
            other => panic!("expected partial creation, got {other:?}"),
        };
        assert_eq!((created, requested), (2, 5));

        let job = manager.get_job(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.unwrap().contains("2 of 5"));

        let tasks = manager.list_tasks(job_id).await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.status == TaskStatus::Cancelled));
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn begin_task_starts_job_and_skips_stale_entries() {
        let (manager, queue) = manager();
        let job = manager.submit("compute", 2, None).await.unwrap();

        let entry = queue.recv().await.unwrap();
        let task = manager.begin_task(entry).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(manager.get_job(job.id).await.unwrap().status, JobStatus::Running);

        // Same entry delivered twice.
        assert!(manager.begin_task(entry).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_start_leaves_task_enqueued_and_requeues_it() {
        let store = FlakyStore::new(usize::MAX, true);
        let queue = TaskQueue::new(16);
        let manager = JobManager::new(store.clone(), queue.clone(), 3);
        let job = manager.submit("compute", 1, None).await.unwrap();

        let entry = queue.recv().await.unwrap();
        let err = manager.begin_task(entry).await.unwrap_err();
        assert!(matches!(err, EngineError::Persistence(StoreError::Storage(_))));

        let task = manager.get_task(entry.task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Enqueued);
        assert_eq!(manager.get_job(job.id).await.unwrap().status, JobStatus::Enqueued);

        // The entry comes back and the retried start goes through.
        let again = queue.recv().await.unwrap();
        assert_eq!(again, entry);
        let task = manager.begin_task(again).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(manager.get_job(job.id).await.unwrap().status, JobStatus::Running);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_outcomes_finish_the_job_exactly_once() {
        let queue = TaskQueue::new(1024);
        let manager = Arc::new(JobManager::new(InMemoryStore::arc(), queue.clone(), 0));
        let job = manager.submit("compute", 1000, None).await.unwrap();

        let mut handles = Vec::with_capacity(1000);
        for i in 0..1000u32 {
            let entry = queue.recv().await.unwrap();
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                let mut task = manager.begin_task(entry).await.unwrap().unwrap();
                if i % 7 == 0 {
                    task.mark_failed("boom").unwrap();
                } else {
                    task.mark_completed(json!({})).unwrap();
                }
                manager.on_task_terminal(task).await.unwrap()
            }));
        }

        let mut terminal = Vec::new();
        for handle in handles {
            if let Some(status) = handle.await.unwrap() {
                terminal.push(status);
            }
        }
        assert_eq!(terminal, vec![JobStatus::Failed]);

        let job = manager.get_job(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failed_tasks, 143);
        assert_eq!(job.completed_tasks + job.failed_tasks, job.total_tasks);
        assert_eq!(manager.tracked_locks(), 0);
    }

    #[tokio::test]
    async fn retry_of_cancelled_job_releases_its_lock() {
        let (manager, queue) = manager();
        let job = manager.submit("compute", 1, None).await.unwrap();

        let entry = queue.recv().await.unwrap();
        let mut task = manager.begin_task(entry).await.unwrap().unwrap();
        manager.cancel(job.id).await.unwrap();
        assert_eq!(manager.tracked_locks(), 0);

        task.mark_retrying("flaky").unwrap();
        assert!(!manager.persist_retrying(&mut task).await.unwrap());
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert_eq!(manager.tracked_locks(), 0);

        assert!(!manager.requeue(entry).await.unwrap());
        assert_eq!(manager.tracked_locks(), 0);
    }

    #[tokio::test]
    async fn terminal_outcomes_complete_the_job_once() {
        let (manager, queue) = manager();
        let job = manager.submit("compute", 2, None).await.unwrap();

        let mut finished = Vec::new();
        for _ in 0..2 {
            let entry = queue.recv().await.unwrap();
            let mut task = manager.begin_task(entry).await.unwrap().unwrap();
            task.mark_completed(json!({"ok": true})).unwrap();
            finished.push(manager.on_task_terminal(task).await.unwrap());
        }
        assert_eq!(finished, vec![None, Some(JobStatus::Completed)]);

        let job = manager.get_job(job.id).await.unwrap();
        assert_eq!(job.completed_tasks, 2);
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn cancel_withdraws_waiting_tasks() {
        let (manager, queue) = manager();
        let job = manager.submit("compute", 3, None).await.unwrap();

        let entry = queue.recv().await.unwrap();
        let mut running = manager.begin_task(entry).await.unwrap().unwrap();

        let cancelled = manager.cancel(job.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);

        let statuses: Vec<_> = manager
            .list_tasks(job.id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.status)
            .collect();
        assert_eq!(
            statuses.iter().filter(|s| **s == TaskStatus::Cancelled).count(),
            2
        );

        // The running task finishes but no longer moves the job.
        running.mark_completed(json!({})).unwrap();
        assert_eq!(manager.on_task_terminal(running).await.unwrap(), None);
        let job = manager.get_job(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.completed_tasks, 0);

        // Leftover queue entries are stale.
        while queue.depth() > 0 {
            let entry = queue.recv().await.unwrap();
            assert!(manager.begin_task(entry).await.unwrap().is_none());
        }
        assert_eq!(manager.tracked_locks(), 0);

        assert!(matches!(
            manager.cancel(job.id).await,
            Err(EngineError::Domain(DomainError::InvalidTransition(_)))
        ));
        assert!(matches!(
            manager.cancel(JobId::new()).await,
            Err(EngineError::Domain(DomainError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn list_jobs_paginates_and_filters() {
        let (manager, _queue) = manager();
        for job_type in ["compute", "data_processing", "compute"] {
            manager.submit(job_type, 1, None).await.unwrap();
        }

        let page = Pagination::new(Some(1), Some(2)).unwrap();
        let listing = manager.list_jobs(page, JobFilter::default()).await.unwrap();
        assert_eq!(listing.total, 3);
        assert_eq!(listing.total_pages, 2);
        assert_eq!(listing.jobs.len(), 2);

        let filtered = manager
            .list_jobs(
                Pagination::default(),
                JobFilter {
                    search: Some("DATA".to_string()),
                    status: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(filtered.total, 1);
        assert_eq!(filtered.jobs[0].job_type, JobType::DataProcessing);
    }

    #[test]
    fn pagination_bounds() {
        assert_eq!(Pagination::new(None, None).unwrap(), Pagination::default());
        assert!(Pagination::new(Some(0), None).is_err());
        assert!(Pagination::new(None, Some(0)).is_err());
        assert!(Pagination::new(None, Some(101)).is_err());
        assert_eq!(Pagination::new(Some(3), Some(10)).unwrap().offset(), 20);
    }
}
