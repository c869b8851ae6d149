use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use taskmill_core::{DomainError, JobId, TaskId};
use taskmill_infra::{EngineError, StoreError};

pub fn engine_error_to_response(err: EngineError) -> axum::response::Response {
    let message = err.to_string();
    match err {
        EngineError::Domain(e) => domain_error_to_response(e),
        EngineError::Persistence(StoreError::JobNotFound(_) | StoreError::TaskNotFound(_)) => {
            json_error(StatusCode::NOT_FOUND, "not_found", message)
        }
        EngineError::Persistence(e) => {
            tracing::error!(error = %e, "record store failure");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "persistence_error", message)
        }
        EngineError::PartialCreation { job_id, .. } => {
            tracing::error!(%job_id, error = %message, "job creation interrupted");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(json!({
                    "error": "partial_creation",
                    "message": message,
                    "job_id": job_id.to_string(),
                })),
            )
                .into_response()
        }
        EngineError::Queue(_) => json_error(StatusCode::SERVICE_UNAVAILABLE, "queue_closed", message),
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::NotFound(msg) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("{msg} not found"))
        }
        DomainError::InvalidTransition(msg) => {
            json_error(StatusCode::CONFLICT, "invalid_transition", msg)
        }
        DomainError::InvariantViolation(msg) => {
            tracing::error!(error = %msg, "invariant violation");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "invariant_violation", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Extractor rejections (bad JSON, bad query strings) share the validation error shape.
pub fn malformed_request(message: String) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", message)
}

pub fn parse_job_id(raw: &str) -> Result<JobId, axum::response::Response> {
    raw.parse().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("{raw:?} is not a valid job id"),
        )
    })
}

pub fn parse_task_id(raw: &str) -> Result<TaskId, axum::response::Response> {
    raw.parse().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("{raw:?} is not a valid task id"),
        )
    })
}
