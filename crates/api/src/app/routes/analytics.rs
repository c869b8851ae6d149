use std::sync::Arc;

use axum::{
    extract::{
        rejection::QueryRejection,
        Extension, Query,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use taskmill_infra::analytics::{recent_limit, timeline_days};
use taskmill_infra::EngineResult;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/overview", get(overview))
        .route("/jobs-by-type", get(jobs_by_type))
        .route("/jobs-by-status", get(jobs_by_status))
        .route("/tasks-by-status", get(tasks_by_status))
        .route("/timeline", get(timeline))
        .route("/processing-time-stats", get(processing_time_stats))
        .route("/recent-jobs", get(recent_jobs))
}

fn respond<T: Serialize>(result: EngineResult<T>) -> axum::response::Response {
    match result {
        Ok(body) => Json(body).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn overview(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    respond(services.analytics().overview().await)
}

pub async fn jobs_by_type(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    respond(services.analytics().jobs_by_type().await)
}

pub async fn jobs_by_status(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    respond(services.analytics().jobs_by_status().await)
}

pub async fn tasks_by_status(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    respond(services.analytics().tasks_by_status().await)
}

pub async fn timeline(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::TimelineQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return errors::malformed_request(rejection.body_text()),
    };
    let days = match timeline_days(query.days) {
        Ok(d) => d,
        Err(e) => return errors::domain_error_to_response(e),
    };
    respond(services.analytics().timeline(days).await)
}

pub async fn processing_time_stats(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    respond(services.analytics().processing_time_stats().await)
}

pub async fn recent_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::RecentJobsQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return errors::malformed_request(rejection.body_text()),
    };
    let limit = match recent_limit(query.limit) {
        Ok(l) => l,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match services.analytics().recent_jobs(limit).await {
        Ok(jobs) => Json(jobs.iter().map(dto::job_to_json).collect::<Vec<_>>()).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
