//! Task record and its state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use taskmill_core::{DomainError, DomainResult, Entity, JobId, TaskId};

use crate::status::TaskStatus;

/// One unit of work inside a job's fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub job_id: JobId,
    /// Position in the fan-out, `0..total_tasks`.
    pub task_index: u32,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub parameters: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time_seconds: Option<f64>,
}

impl Task {
    pub fn new(job_id: JobId, task_index: u32, max_retries: u32, parameters: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            job_id,
            task_index,
            status: TaskStatus::Pending,
            retry_count: 0,
            max_retries,
            parameters,
            result: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            processing_time_seconds: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether another attempt is allowed after the current one fails.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// `PENDING | RETRYING → ENQUEUED`.
    pub fn mark_enqueued(&mut self) -> DomainResult<()> {
        self.expect_one_of(&[TaskStatus::Pending, TaskStatus::Retrying], TaskStatus::Enqueued)?;
        self.status = TaskStatus::Enqueued;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// `ENQUEUED → RUNNING`. `started_at` is reset for every attempt.
    pub fn mark_running(&mut self) -> DomainResult<()> {
        self.expect_one_of(&[TaskStatus::Enqueued], TaskStatus::Running)?;
        let now = Utc::now();
        self.status = TaskStatus::Running;
        self.started_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// `RUNNING → COMPLETED`.
    pub fn mark_completed(&mut self, result: serde_json::Value) -> DomainResult<()> {
        self.expect_one_of(&[TaskStatus::Running], TaskStatus::Completed)?;
        self.result = Some(result);
        self.finish(TaskStatus::Completed);
        Ok(())
    }

    /// `RUNNING → RETRYING`, consuming one unit of the retry budget.
    pub fn mark_retrying(&mut self, error: impl Into<String>) -> DomainResult<()> {
        self.expect_one_of(&[TaskStatus::Running], TaskStatus::Retrying)?;
        if !self.can_retry() {
            return Err(DomainError::invariant(format!(
                "task {} exhausted its {} retries",
                self.id, self.max_retries
            )));
        }
        self.retry_count += 1;
        self.error_message = Some(error.into());
        self.status = TaskStatus::Retrying;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// `RUNNING → FAILED`.
    pub fn mark_failed(&mut self, error: impl Into<String>) -> DomainResult<()> {
        self.expect_one_of(&[TaskStatus::Running], TaskStatus::Failed)?;
        self.error_message = Some(error.into());
        self.finish(TaskStatus::Failed);
        Ok(())
    }

    /// Withdraw a task that has not started running.
    pub fn mark_cancelled(&mut self) -> DomainResult<()> {
        self.expect_one_of(
            &[TaskStatus::Pending, TaskStatus::Enqueued, TaskStatus::Retrying],
            TaskStatus::Cancelled,
        )?;
        let now = Utc::now();
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    fn finish(&mut self, status: TaskStatus) {
        let now = Utc::now();
        self.status = status;
        self.completed_at = Some(now);
        self.updated_at = now;
        self.processing_time_seconds = self
            .started_at
            .map(|started| (now - started).num_microseconds().unwrap_or(0) as f64 / 1_000_000.0);
    }

    fn expect_one_of(&self, allowed: &[TaskStatus], to: TaskStatus) -> DomainResult<()> {
        if allowed.contains(&self.status) {
            return Ok(());
        }
        Err(DomainError::invalid_transition(format!(
            "task {} cannot move from {} to {to}",
            self.id, self.status
        )))
    }
}

impl Entity for Task {
    type Id = TaskId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn running_task(max_retries: u32) -> Task {
        let mut task = Task::new(JobId::new(), 0, max_retries, json!({}));
        task.mark_enqueued().unwrap();
        task.mark_running().unwrap();
        task
    }

    #[test]
    fn happy_path_records_timing() {
        let mut task = running_task(3);
        assert!(task.started_at.is_some());

        task.mark_completed(json!({"status": "completed"})).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.completed_at.is_some());
        assert!(task.processing_time_seconds.unwrap() >= 0.0);
        assert_eq!(task.result.as_ref().unwrap()["status"], "completed");
    }

    #[test]
    fn retry_budget_is_enforced() {
        let mut task = running_task(1);
        assert!(task.can_retry());
        task.mark_retrying("flaky").unwrap();
        assert_eq!(task.status, TaskStatus::Retrying);
        assert_eq!(task.retry_count, 1);

        task.mark_enqueued().unwrap();
        task.mark_running().unwrap();
        assert!(!task.can_retry());
        assert!(matches!(
            task.mark_retrying("flaky again"),
            Err(DomainError::InvariantViolation(_))
        ));

        task.mark_failed("flaky again").unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error_message.as_deref(), Some("flaky again"));
        assert_eq!(task.retry_count, 1);
    }

    #[test]
    fn zero_budget_never_retries() {
        let task = running_task(0);
        assert!(!task.can_retry());
    }

    #[test]
    fn only_waiting_tasks_can_be_cancelled() {
        let mut task = Task::new(JobId::new(), 2, 0, json!({}));
        task.mark_cancelled().unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);

        let mut task = running_task(0);
        assert!(matches!(
            task.mark_cancelled(),
            Err(DomainError::InvalidTransition(_))
        ));
    }

    #[test]
    fn terminal_tasks_reject_further_transitions() {
        let mut task = running_task(2);
        task.mark_completed(json!({})).unwrap();
        assert!(task.mark_enqueued().is_err());
        assert!(task.mark_running().is_err());
        assert!(task.mark_failed("late").is_err());
    }
}
