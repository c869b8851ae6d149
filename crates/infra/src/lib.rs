//! Infrastructure layer: record stores, task queue, worker pool, retries,
//! job orchestration and analytics.

pub mod analytics;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod manager;
pub mod queue;
pub mod retry;
pub mod store;
pub mod workload;

pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, EngineHealth};
pub use error::{EngineError, EngineResult};
pub use manager::{JobFilter, JobListing, JobManager, Pagination};
pub use store::{InMemoryStore, RecordStore, StoreError};
