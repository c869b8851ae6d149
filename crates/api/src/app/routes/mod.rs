use axum::Router;

pub mod analytics;
pub mod jobs;
pub mod system;
pub mod tasks;

/// Router for the versioned `/api/v1` surface.
pub fn router() -> Router {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/tasks", tasks::router())
        .nest("/analytics", analytics::router())
}
