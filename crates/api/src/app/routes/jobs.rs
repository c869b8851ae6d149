use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use taskmill_jobs::JobStatus;
use taskmill_infra::{JobFilter, Pagination};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_job).get(list_jobs))
        .route("/:id", get(get_job))
        .route("/:id/cancel", post(cancel_job))
        .route("/:id/tasks", get(list_job_tasks))
}

pub async fn create_job(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CreateJobRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::malformed_request(rejection.body_text()),
    };
    match services
        .jobs()
        .submit(&body.job_type, body.num_tasks, body.parameters)
        .await
    {
        Ok(job) => (StatusCode::CREATED, Json(dto::job_to_json(&job))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::ListJobsQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return errors::malformed_request(rejection.body_text()),
    };
    let page = match Pagination::new(query.page, query.page_size) {
        Ok(p) => p,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let status = match query.status.as_deref().map(str::parse::<JobStatus>).transpose() {
        Ok(s) => s,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let filter = JobFilter {
        search: query.search.filter(|s| !s.trim().is_empty()),
        status,
    };

    match services.jobs().list_jobs(page, filter).await {
        Ok(listing) => Json(dto::job_listing_to_json(&listing)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match errors::parse_job_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.jobs().get_job(job_id).await {
        Ok(job) => Json(dto::job_to_json(&job)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn cancel_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match errors::parse_job_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.jobs().cancel(job_id).await {
        Ok(job) => Json(dto::job_to_json(&job)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list_job_tasks(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match errors::parse_job_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.jobs().list_tasks(job_id).await {
        Ok(tasks) => Json(dto::task_list_to_json(&tasks)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
