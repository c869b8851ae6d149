//! Job and workload kinds.
//!
//! Both are open string enumerations on the wire. Known values map to a
//! closed set of variants so dispatch stays exhaustive; anything else is kept
//! verbatim in `Other`.

use serde::{Deserialize, Serialize};

use taskmill_core::{DomainError, DomainResult};

/// Caller-supplied job category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobType {
    Compute,
    DataProcessing,
    MlInference,
    Other(String),
}

impl JobType {
    /// Parse a caller-supplied job type, rejecting blank values.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("job_type must not be empty"));
        }
        Ok(Self::from(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobType::Compute => "compute",
            JobType::DataProcessing => "data_processing",
            JobType::MlInference => "ml_inference",
            JobType::Other(s) => s,
        }
    }
}

impl From<String> for JobType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "compute" => JobType::Compute,
            "data_processing" => JobType::DataProcessing,
            "ml_inference" => JobType::MlInference,
            _ => JobType::Other(value),
        }
    }
}

impl From<JobType> for String {
    fn from(value: JobType) -> Self {
        match value {
            JobType::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl core::fmt::Display for JobType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Simulated workload a task performs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WorkType {
    /// Busy computation for the requested duration.
    CpuBound,
    /// Non-blocking wait for the requested duration.
    IoBound,
    /// Dense square matrix multiply.
    MatrixMultiply,
    /// Unknown kind; executed as a plain wait.
    Other(String),
}

impl WorkType {
    pub fn as_str(&self) -> &str {
        match self {
            WorkType::CpuBound => "cpu_bound",
            WorkType::IoBound => "io_bound",
            WorkType::MatrixMultiply => "matrix_multiply",
            WorkType::Other(s) => s,
        }
    }
}

impl Default for WorkType {
    fn default() -> Self {
        WorkType::CpuBound
    }
}

impl From<String> for WorkType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "cpu_bound" => WorkType::CpuBound,
            "io_bound" => WorkType::IoBound,
            "matrix_multiply" => WorkType::MatrixMultiply,
            _ => WorkType::Other(value),
        }
    }
}

impl From<WorkType> for String {
    fn from(value: WorkType) -> Self {
        match value {
            WorkType::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl core::fmt::Display for WorkType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_job_types_map_to_variants() {
        assert_eq!(JobType::parse("compute").unwrap(), JobType::Compute);
        assert_eq!(JobType::parse(" ml_inference ").unwrap(), JobType::MlInference);
        assert_eq!(
            JobType::parse("video_render").unwrap(),
            JobType::Other("video_render".to_string())
        );
    }

    #[test]
    fn blank_job_type_is_rejected() {
        assert!(matches!(JobType::parse("   "), Err(DomainError::Validation(_))));
    }

    #[test]
    fn kinds_round_trip_through_plain_strings() {
        let json = serde_json::to_string(&JobType::DataProcessing).unwrap();
        assert_eq!(json, "\"data_processing\"");

        let wt: WorkType = serde_json::from_str("\"gpu_burn\"").unwrap();
        assert_eq!(wt, WorkType::Other("gpu_burn".to_string()));
        assert_eq!(serde_json::to_string(&wt).unwrap(), "\"gpu_burn\"");
    }
}
