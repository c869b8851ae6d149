//! Retry policy and the controller that applies it to failed task attempts.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use taskmill_jobs::{JobStatus, Task};

use crate::error::EngineResult;
use crate::manager::JobManager;
use crate::queue::QueueEntry;

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Exponential backoff: base * 2^(attempt - 1)
    #[default]
    Exponential,
    /// Linear backoff: base * attempt
    Linear,
}

impl FromStr for BackoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(BackoffStrategy::Fixed),
            "exponential" => Ok(BackoffStrategy::Exponential),
            "linear" => Ok(BackoffStrategy::Linear),
            other => Err(format!("unknown backoff strategy {other:?}")),
        }
    }
}

/// Delay schedule between task attempts.
///
/// The attempt budget lives on each task (`max_retries`); the policy only
/// decides how long to wait before attempt `n`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    /// Jitter factor (0.0-1.0)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Retry immediately.
    pub fn immediate() -> Self {
        Self::fixed(Duration::ZERO)
    }

    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
            jitter: 0.0,
        }
    }

    pub fn exponential(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }

    /// Delay before retry number `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;

        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Exponential => {
                let exp = 2_f64.powi((attempt - 1).min(30) as i32);
                (base_ms * exp).min(max_ms)
            }
            BackoffStrategy::Linear => (base_ms * attempt as f64).min(max_ms),
        };

        // Deterministic jitter keyed on the attempt number.
        let jitter_range = delay_ms * self.jitter;
        let jitter = if jitter_range > 0.0 {
            let pseudo_random = ((attempt as f64 * 17.0) % 100.0) / 100.0;
            jitter_range * (pseudo_random - 0.5) * 2.0
        } else {
            0.0
        };

        Duration::from_millis((delay_ms + jitter).clamp(0.0, max_ms.max(base_ms)) as u64)
    }
}

/// What happened to a task after an attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Task finished; carries the job's terminal status if it finished too.
    Completed(Option<JobStatus>),
    /// Another attempt is scheduled after `delay`.
    Retrying { attempt: u32, delay: Duration },
    /// Retries exhausted; carries the job's terminal status if it finished.
    Failed(Option<JobStatus>),
    /// The job finished while the attempt ran; the task was cancelled.
    Dropped,
}

/// Decides between retry and terminal failure, and reports terminal task
/// outcomes to the job manager.
pub struct RetryController {
    manager: Arc<JobManager>,
    policy: RetryPolicy,
    shutdown: CancellationToken,
}

impl RetryController {
    pub fn new(manager: Arc<JobManager>, policy: RetryPolicy, shutdown: CancellationToken) -> Self {
        Self {
            manager,
            policy,
            shutdown,
        }
    }

    /// Task ended in COMPLETED.
    pub async fn on_task_success(&self, task: Task) -> EngineResult<RetryDecision> {
        let finished = self.manager.on_task_terminal(task).await?;
        Ok(RetryDecision::Completed(finished))
    }

    /// A RUNNING task's attempt failed with `error`.
    pub async fn on_task_failure(
        &self,
        mut task: Task,
        error: String,
    ) -> EngineResult<RetryDecision> {
        if !task.can_retry() {
            warn!(
                task_id = %task.id,
                job_id = %task.job_id,
                retry_count = task.retry_count,
                error = %error,
                "task failed; retries exhausted"
            );
            task.mark_failed(error)?;
            let finished = self.manager.on_task_terminal(task).await?;
            return Ok(RetryDecision::Failed(finished));
        }

        task.mark_retrying(error)?;
        if !self.manager.persist_retrying(&mut task).await? {
            return Ok(RetryDecision::Dropped);
        }

        let attempt = task.retry_count;
        let delay = self.policy.delay_for_attempt(attempt);
        warn!(
            task_id = %task.id,
            job_id = %task.job_id,
            attempt,
            max_retries = task.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = task.error_message.as_deref().unwrap_or_default(),
            "task failed; scheduling retry"
        );

        let entry = QueueEntry {
            task_id: task.id,
            job_id: task.job_id,
        };
        let manager = self.manager.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = manager.requeue(entry).await {
                        error!(task_id = %entry.task_id, error = %e, "failed to requeue task");
                    }
                }
            }
        });

        Ok(RetryDecision::Retrying { attempt, delay })
    }
}
