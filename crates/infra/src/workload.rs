//! Simulated task workloads.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};

use taskmill_jobs::{Task, WorkType, WorkloadSpec};

/// Failure of a single task attempt. Recovered by the retry controller.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum WorkloadError {
    #[error("invalid task parameters: {0}")]
    InvalidParameters(String),
    #[error("workload failed: {0}")]
    Failed(String),
    #[error("workload aborted: {0}")]
    Aborted(String),
}

/// Executes the work of one task attempt.
///
/// Returns workload-specific details that are merged into the task result.
#[async_trait]
pub trait WorkloadRunner: Send + Sync {
    async fn run(&self, task: &Task) -> Result<Value, WorkloadError>;
}

/// Built-in workloads selected by the task's `work_type`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedWorkload;

#[async_trait]
impl WorkloadRunner for SimulatedWorkload {
    async fn run(&self, task: &Task) -> Result<Value, WorkloadError> {
        let spec = WorkloadSpec::from_parameters(Some(&task.parameters))
            .map_err(|e| WorkloadError::InvalidParameters(e.to_string()))?;
        let duration = Duration::from_secs_f64(spec.work_duration_seconds);

        match spec.work_type {
            WorkType::CpuBound => {
                let iterations = blocking(move || busy_compute(duration)).await?;
                Ok(json!({ "iterations": iterations }))
            }
            WorkType::IoBound => {
                tokio::time::sleep(duration).await;
                Ok(json!({}))
            }
            WorkType::MatrixMultiply => {
                let size = spec
                    .matrix_size
                    .unwrap_or(taskmill_jobs::params::DEFAULT_MATRIX_SIZE) as usize;
                let checksum = blocking(move || matrix_multiply_checksum(size)).await?;
                tokio::time::sleep(duration).await;
                Ok(json!({ "matrix_size": size, "checksum": checksum }))
            }
            WorkType::Other(_) => {
                tokio::time::sleep(duration).await;
                Ok(json!({}))
            }
        }
    }
}

async fn blocking<T, F>(f: F) -> Result<T, WorkloadError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| WorkloadError::Aborted(e.to_string()))
}

/// Spin on arithmetic until `duration` has elapsed. Returns the number of
/// rounds performed.
pub fn busy_compute(duration: Duration) -> u64 {
    let deadline = Instant::now() + duration;
    let mut rounds = 0u64;
    let mut acc = 0u64;
    loop {
        for i in 0..1_000u64 {
            acc = acc.wrapping_add(i.wrapping_mul(i));
        }
        rounds += 1;
        if Instant::now() >= deadline {
            break;
        }
    }
    std::hint::black_box(acc);
    rounds
}

/// Multiply two deterministic `n × n` matrices and return the sum of the
/// product's entries.
pub fn matrix_multiply_checksum(n: usize) -> f64 {
    let a: Vec<f64> = (0..n * n).map(|k| ((k % 7) as f64) * 0.5).collect();
    let b: Vec<f64> = (0..n * n).map(|k| ((k % 5) as f64) * 0.25).collect();
    let mut c = vec![0.0f64; n * n];

    for i in 0..n {
        for k in 0..n {
            let aik = a[i * n + k];
            let row = &b[k * n..(k + 1) * n];
            let out = &mut c[i * n..(i + 1) * n];
            for (o, bkj) in out.iter_mut().zip(row) {
                *o += aik * bkj;
            }
        }
    }
    c.iter().sum()
}
