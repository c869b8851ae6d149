//! Job/task domain model.
//!
//! Status machines, workload kinds and parameter resolution for the
//! orchestration engine, implemented as deterministic domain logic (no IO,
//! no HTTP, no storage).

pub mod job;
pub mod kind;
pub mod params;
pub mod status;
pub mod task;

pub use job::{Job, TaskOutcome};
pub use kind::{JobType, WorkType};
pub use params::{WorkloadSpec, MAX_TASKS, MIN_TASKS, validate_num_tasks};
pub use status::{JobStatus, TaskStatus};
pub use task::Task;
