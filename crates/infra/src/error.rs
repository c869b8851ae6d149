//! Engine-level error model.

use taskmill_core::{DomainError, JobId};

use crate::queue::QueueError;
use crate::store::StoreError;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// Rejected input or illegal transition from the domain model.
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    /// Fan-out stopped part way; the job was marked FAILED and its created
    /// tasks CANCELLED.
    #[error("job {job_id}: created {created} of {requested} tasks: {reason}")]
    PartialCreation {
        job_id: JobId,
        created: u32,
        requested: u32,
        reason: String,
    },

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl EngineError {
    pub fn job_not_found(id: JobId) -> Self {
        Self::Domain(DomainError::not_found(format!("job {id}")))
    }

    pub fn task_not_found(id: taskmill_core::TaskId) -> Self {
        Self::Domain(DomainError::not_found(format!("task {id}")))
    }
}
