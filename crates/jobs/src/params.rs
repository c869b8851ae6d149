//! Submission limits and workload parameter resolution.
//!
//! Job parameters are an opaque JSON object owned by the caller. The engine
//! only reads the workload fields below; every other key is passed through to
//! the tasks untouched.
//!
//! | Key | Type | Default | Constraint |
//! |-----|------|---------|------------|
//! | `work_type` | string | `cpu_bound` | any string (unknown kinds wait) |
//! | `work_duration_seconds` | number | `2.0` | finite, `0..=3600` |
//! | `matrix_size` | integer | `100` | `10..=1000` |
//! | `max_retries` | integer | engine default | `0..=10` |

use serde_json::{Map, Value};

use taskmill_core::{DomainError, DomainResult};

use crate::kind::WorkType;

pub const MIN_TASKS: u32 = 1;
pub const MAX_TASKS: u32 = 1000;

pub const MIN_MATRIX_SIZE: u32 = 10;
pub const MAX_MATRIX_SIZE: u32 = 1000;
pub const DEFAULT_MATRIX_SIZE: u32 = 100;

pub const DEFAULT_WORK_DURATION_SECONDS: f64 = 2.0;
pub const MAX_WORK_DURATION_SECONDS: f64 = 3600.0;

pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Validate the requested fan-out size.
pub fn validate_num_tasks(num_tasks: i64) -> DomainResult<u32> {
    if num_tasks < i64::from(MIN_TASKS) || num_tasks > i64::from(MAX_TASKS) {
        return Err(DomainError::validation(format!(
            "num_tasks must be between {MIN_TASKS} and {MAX_TASKS}, got {num_tasks}"
        )));
    }
    Ok(num_tasks as u32)
}

/// Workload fields resolved from a job's parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadSpec {
    pub work_type: WorkType,
    pub work_duration_seconds: f64,
    /// Only set for `matrix_multiply`.
    pub matrix_size: Option<u32>,
    /// Per-job override of the engine's retry budget.
    pub max_retries: Option<u32>,
}

impl Default for WorkloadSpec {
    fn default() -> Self {
        Self {
            work_type: WorkType::default(),
            work_duration_seconds: DEFAULT_WORK_DURATION_SECONDS,
            matrix_size: None,
            max_retries: None,
        }
    }
}

impl WorkloadSpec {
    /// Resolve and validate the workload fields of a parameters payload.
    ///
    /// `None` and JSON `null` both mean "all defaults"; any other non-object
    /// payload is rejected.
    pub fn from_parameters(parameters: Option<&Value>) -> DomainResult<Self> {
        let map = match parameters {
            None | Some(Value::Null) => return Ok(Self::default()),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(DomainError::validation("parameters must be a JSON object"));
            }
        };

        let work_type = match map.get("work_type") {
            None | Some(Value::Null) => WorkType::default(),
            Some(Value::String(s)) => WorkType::from(s.clone()),
            Some(_) => return Err(DomainError::validation("work_type must be a string")),
        };

        let work_duration_seconds = match map.get("work_duration_seconds") {
            None | Some(Value::Null) => DEFAULT_WORK_DURATION_SECONDS,
            Some(v) => {
                let secs = v.as_f64().ok_or_else(|| {
                    DomainError::validation("work_duration_seconds must be a number")
                })?;
                if !secs.is_finite() || !(0.0..=MAX_WORK_DURATION_SECONDS).contains(&secs) {
                    return Err(DomainError::validation(format!(
                        "work_duration_seconds must be between 0 and {MAX_WORK_DURATION_SECONDS}"
                    )));
                }
                secs
            }
        };

        let matrix_size = match map.get("matrix_size") {
            None | Some(Value::Null) => None,
            Some(v) => Some(bounded_u32(
                v,
                "matrix_size",
                MIN_MATRIX_SIZE,
                MAX_MATRIX_SIZE,
            )?),
        };
        let matrix_size = match work_type {
            WorkType::MatrixMultiply => Some(matrix_size.unwrap_or(DEFAULT_MATRIX_SIZE)),
            _ => matrix_size,
        };

        let max_retries = match map.get("max_retries") {
            None | Some(Value::Null) => None,
            Some(v) => Some(bounded_u32(v, "max_retries", 0, MAX_RETRIES_LIMIT)?),
        };

        Ok(Self {
            work_type,
            work_duration_seconds,
            matrix_size,
            max_retries,
        })
    }

    /// Build a task's parameters: the job payload with the resolved workload
    /// fields written back so each task record is self-describing.
    pub fn task_parameters(&self, job_parameters: Option<&Value>) -> Value {
        let mut map = match job_parameters {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        map.insert(
            "work_type".to_string(),
            Value::String(self.work_type.as_str().to_string()),
        );
        map.insert(
            "work_duration_seconds".to_string(),
            serde_json::json!(self.work_duration_seconds),
        );
        if let Some(size) = self.matrix_size {
            map.insert("matrix_size".to_string(), Value::from(size));
        }
        Value::Object(map)
    }
}

fn bounded_u32(value: &Value, field: &str, min: u32, max: u32) -> DomainResult<u32> {
    let n = value
        .as_u64()
        .ok_or_else(|| DomainError::validation(format!("{field} must be a non-negative integer")))?;
    if n < u64::from(min) || n > u64::from(max) {
        return Err(DomainError::validation(format!(
            "{field} must be between {min} and {max}, got {n}"
        )));
    }
    Ok(n as u32)
}
