//! Engine wiring: store, queue, manager, retry controller and worker pool.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::analytics::AnalyticsAggregator;
use crate::config::EngineConfig;
use crate::executor::{ExecutorConfig, ExecutorHandle, ExecutorPool, ExecutorStats};
use crate::manager::JobManager;
use crate::queue::TaskQueue;
use crate::retry::RetryController;
use crate::store::RecordStore;
use crate::workload::{SimulatedWorkload, WorkloadRunner};

/// Snapshot for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct EngineHealth {
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub executor: ExecutorStats,
}

/// A running orchestration engine.
pub struct Engine {
    manager: Arc<JobManager>,
    analytics: AnalyticsAggregator,
    queue: TaskQueue,
    executor: ExecutorHandle,
}

impl Engine {
    /// Start the engine with the built-in simulated workloads.
    pub fn start(config: EngineConfig, store: Arc<dyn RecordStore>) -> Self {
        Self::start_with_runner(config, store, Arc::new(SimulatedWorkload))
    }

    /// Start the engine with a custom workload runner.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_with_runner(
        config: EngineConfig,
        store: Arc<dyn RecordStore>,
        runner: Arc<dyn WorkloadRunner>,
    ) -> Self {
        let queue = TaskQueue::new(config.queue_capacity);
        let manager = Arc::new(JobManager::new(
            store.clone(),
            queue.clone(),
            config.max_task_retries,
        ));
        let shutdown = CancellationToken::new();
        let retry = Arc::new(RetryController::new(
            manager.clone(),
            config.retry_policy.clone(),
            shutdown.clone(),
        ));
        let executor = ExecutorPool::start(
            ExecutorConfig::default()
                .with_worker_count(config.worker_count)
                .with_task_timeout(config.task_timeout),
            queue.clone(),
            manager.clone(),
            retry,
            runner,
            shutdown,
        );

        info!(
            workers = config.worker_count,
            queue_capacity = queue.capacity(),
            max_task_retries = config.max_task_retries,
            "engine started"
        );

        Self {
            manager,
            analytics: AnalyticsAggregator::new(store),
            queue,
            executor,
        }
    }

    pub fn manager(&self) -> &Arc<JobManager> {
        &self.manager
    }

    pub fn analytics(&self) -> &AnalyticsAggregator {
        &self.analytics
    }

    pub fn health(&self) -> EngineHealth {
        EngineHealth {
            queue_depth: self.queue.depth(),
            queue_capacity: self.queue.capacity(),
            executor: self.executor.stats(),
        }
    }

    /// Stop workers and pending retry timers; in-flight attempts finish first.
    /// The queue is closed afterwards, so later submissions fail.
    pub async fn shutdown(&self) {
        self.executor.shutdown().await;
        self.queue.close().await;
        info!(abandoned_entries = self.queue.depth(), "engine stopped");
    }
}
