//! Job record and its aggregate state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use taskmill_core::{DomainError, DomainResult, Entity, JobId};

use crate::kind::JobType;
use crate::status::JobStatus;

/// Terminal result of one task, as seen by its job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed { reason: String },
}

/// A client submission fanned out into `total_tasks` tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    pub status: JobStatus,
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub failed_tasks: u32,
    /// Opaque caller payload (JSON object), immutable after creation.
    pub parameters: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Reason of the first terminally failed task, quoted in the FAILED summary.
    #[serde(default)]
    pub first_failure: Option<String>,
}

impl Job {
    /// Create a new job in `PENDING`.
    pub fn new(job_type: JobType, total_tasks: u32, parameters: Option<serde_json::Value>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            job_type,
            status: JobStatus::Pending,
            total_tasks,
            completed_tasks: 0,
            failed_tasks: 0,
            parameters,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            error_message: None,
            first_failure: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Tasks that reached a terminal outcome.
    pub fn processed_tasks(&self) -> u32 {
        self.completed_tasks + self.failed_tasks
    }

    /// `PENDING → CREATING_TASKS`.
    pub fn begin_fan_out(&mut self) -> DomainResult<()> {
        self.transition(JobStatus::Pending, JobStatus::CreatingTasks)
    }

    /// `CREATING_TASKS → ENQUEUED`.
    pub fn mark_enqueued(&mut self) -> DomainResult<()> {
        self.transition(JobStatus::CreatingTasks, JobStatus::Enqueued)
    }

    /// First task entered `RUNNING`. Returns whether the job changed.
    pub fn mark_started(&mut self) -> bool {
        if self.status != JobStatus::Enqueued {
            return false;
        }
        let now = Utc::now();
        self.status = JobStatus::Running;
        self.started_at.get_or_insert(now);
        self.updated_at = now;
        true
    }

    /// Fan-out was interrupted; the job fails without ever being enqueued.
    pub fn fail_creation(&mut self, reason: impl Into<String>) -> DomainResult<()> {
        if !matches!(self.status, JobStatus::Pending | JobStatus::CreatingTasks) {
            return Err(DomainError::invalid_transition(format!(
                "job {} cannot fail creation from {}",
                self.id, self.status
            )));
        }
        self.finish(JobStatus::Failed);
        self.error_message = Some(reason.into());
        Ok(())
    }

    /// Cancel a non-terminal job.
    pub fn cancel(&mut self) -> DomainResult<()> {
        if self.is_terminal() {
            return Err(DomainError::invalid_transition(format!(
                "job {} is already {}",
                self.id, self.status
            )));
        }
        self.finish(JobStatus::Cancelled);
        Ok(())
    }

    /// Apply one task's terminal outcome to the aggregate counters.
    ///
    /// Returns the terminal status when this outcome completes the job.
    pub fn record_task_outcome(&mut self, outcome: TaskOutcome) -> DomainResult<Option<JobStatus>> {
        match self.status {
            JobStatus::Enqueued | JobStatus::Running => {}
            other => {
                return Err(DomainError::invalid_transition(format!(
                    "job {} cannot record task outcomes while {other}",
                    self.id
                )));
            }
        }
        if self.processed_tasks() >= self.total_tasks {
            return Err(DomainError::invariant(format!(
                "job {} already accounted for all {} tasks",
                self.id, self.total_tasks
            )));
        }

        self.mark_started();
        match outcome {
            TaskOutcome::Completed => self.completed_tasks += 1,
            TaskOutcome::Failed { reason } => {
                self.failed_tasks += 1;
                self.first_failure.get_or_insert(reason);
            }
        }
        self.updated_at = Utc::now();

        if self.processed_tasks() < self.total_tasks {
            return Ok(None);
        }

        if self.failed_tasks == 0 {
            self.finish(JobStatus::Completed);
        } else {
            let reason = self.first_failure.as_deref().unwrap_or("unknown error");
            self.error_message = Some(format!(
                "{} of {} tasks failed; first failure: {}",
                self.failed_tasks, self.total_tasks, reason
            ));
            self.finish(JobStatus::Failed);
        }
        Ok(Some(self.status))
    }

    fn transition(&mut self, from: JobStatus, to: JobStatus) -> DomainResult<()> {
        if self.status != from {
            return Err(DomainError::invalid_transition(format!(
                "job {} expected {from} to move to {to}, found {}",
                self.id, self.status
            )));
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn finish(&mut self, status: JobStatus) {
        let now = Utc::now();
        self.status = status;
        self.completed_at = Some(now);
        self.updated_at = now;
    }
}

impl Entity for Job {
    type Id = JobId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
