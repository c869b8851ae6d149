use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/:id", get(get_task))
}

pub async fn get_task(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let task_id = match errors::parse_task_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.jobs().get_task(task_id).await {
        Ok(task) => Json(dto::task_to_json(&task)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
