//! Worker pool that drains the task queue.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use taskmill_jobs::Task;

use crate::manager::JobManager;
use crate::queue::{QueueEntry, TaskQueue};
use crate::retry::{RetryController, RetryDecision};
use crate::workload::WorkloadRunner;

pub const DEFAULT_WORKER_COUNT: usize = 8;
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub worker_count: usize,
    /// Upper bound for a single attempt.
    pub task_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            task_timeout: DEFAULT_TASK_TIMEOUT,
        }
    }
}

impl ExecutorConfig {
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }
}

/// Executor runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutorStats {
    pub worker_count: usize,
    pub tasks_processed: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub tasks_retried: u64,
    pub current_running: usize,
    pub uptime_secs: u64,
}

#[derive(Debug)]
struct Counters {
    started: Instant,
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    running: AtomicUsize,
}

impl Counters {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            processed: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            running: AtomicUsize::new(0),
        }
    }
}

/// Handle to control a running pool.
pub struct ExecutorHandle {
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
    worker_count: usize,
}

impl ExecutorHandle {
    /// Get current executor statistics.
    pub fn stats(&self) -> ExecutorStats {
        let c = &self.counters;
        ExecutorStats {
            worker_count: self.worker_count,
            tasks_processed: c.processed.load(Ordering::Relaxed),
            tasks_succeeded: c.succeeded.load(Ordering::Relaxed),
            tasks_failed: c.failed.load(Ordering::Relaxed),
            tasks_retried: c.retried.load(Ordering::Relaxed),
            current_running: c.running.load(Ordering::Relaxed),
            uptime_secs: c.started.elapsed().as_secs(),
        }
    }

    /// Stop taking new entries and wait for in-flight attempts to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "worker terminated abnormally");
            }
        }
    }
}

/// Fixed-size pool of workers sharing one [`TaskQueue`].
pub struct ExecutorPool;

impl ExecutorPool {
    /// Spawn `config.worker_count` workers on the current runtime.
    pub fn start(
        config: ExecutorConfig,
        queue: TaskQueue,
        manager: Arc<JobManager>,
        retry: Arc<RetryController>,
        runner: Arc<dyn WorkloadRunner>,
        shutdown: CancellationToken,
    ) -> ExecutorHandle {
        let worker_count = config.worker_count.max(1);
        let counters = Arc::new(Counters::new());

        info!(
            workers = worker_count,
            task_timeout_secs = config.task_timeout.as_secs(),
            "starting task executor"
        );

        let workers = (0..worker_count)
            .map(|worker_id| {
                let worker = Worker {
                    id: worker_id,
                    task_timeout: config.task_timeout,
                    queue: queue.clone(),
                    manager: manager.clone(),
                    retry: retry.clone(),
                    runner: runner.clone(),
                    counters: counters.clone(),
                };
                tokio::spawn(worker.run(shutdown.clone()))
            })
            .collect();

        ExecutorHandle {
            shutdown,
            workers: Mutex::new(workers),
            counters,
            worker_count,
        }
    }
}

struct Worker {
    id: usize,
    task_timeout: Duration,
    queue: TaskQueue,
    manager: Arc<JobManager>,
    retry: Arc<RetryController>,
    runner: Arc<dyn WorkloadRunner>,
    counters: Arc<Counters>,
}

impl Worker {
    async fn run(self, shutdown: CancellationToken) {
        debug!(worker = self.id, "worker started");
        loop {
            let entry = tokio::select! {
                _ = shutdown.cancelled() => break,
                entry = self.queue.recv() => match entry {
                    Some(entry) => entry,
                    None => break,
                },
            };
            self.process(entry).await;
        }
        debug!(worker = self.id, "worker stopped");
    }

    async fn process(&self, entry: QueueEntry) {
        let task = match self.manager.begin_task(entry).await {
            Ok(Some(task)) => task,
            Ok(None) => return,
            Err(e) => {
                error!(task_id = %entry.task_id, error = %e, "failed to start task");
                return;
            }
        };

        self.counters.running.fetch_add(1, Ordering::Relaxed);
        debug!(worker = self.id, task_id = %task.id, task_index = task.task_index, "task running");

        let started = Instant::now();
        let attempt = tokio::time::timeout(self.task_timeout, self.runner.run(&task)).await;
        let elapsed = started.elapsed().as_secs_f64();

        let decision = match attempt {
            Ok(Ok(details)) => {
                let mut task = task;
                let result = completed_result(&task, elapsed, details);
                match task.mark_completed(result) {
                    Ok(()) => self.retry.on_task_success(task).await,
                    Err(e) => Err(e.into()),
                }
            }
            Ok(Err(e)) => self.retry.on_task_failure(task, e.to_string()).await,
            Err(_) => {
                let msg = format!("task timed out after {:?}", self.task_timeout);
                self.retry.on_task_failure(task, msg).await
            }
        };

        self.counters.running.fetch_sub(1, Ordering::Relaxed);
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        match decision {
            Ok(RetryDecision::Completed(_)) => {
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            Ok(RetryDecision::Failed(_)) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(RetryDecision::Retrying { .. }) => {
                self.counters.retried.fetch_add(1, Ordering::Relaxed);
            }
            Ok(RetryDecision::Dropped) => {}
            Err(e) => {
                error!(task_id = %entry.task_id, job_id = %entry.job_id, error = %e, "failed to record task outcome");
            }
        }
    }
}

/// Result payload of a completed task: identity, timing and workload details.
fn completed_result(task: &Task, elapsed_secs: f64, details: Value) -> Value {
    let mut result = json!({
        "task_id": task.id,
        "job_id": task.job_id,
        "task_index": task.task_index,
        "work_type": task.parameters.get("work_type").cloned().unwrap_or(Value::Null),
        "processing_time_seconds": elapsed_secs,
        "status": "completed",
    });
    if let (Value::Object(out), Value::Object(extra)) = (&mut result, details) {
        for (k, v) in extra {
            out.entry(k).or_insert(v);
        }
    }
    result
}
