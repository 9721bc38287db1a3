//! Admin routes for the batch job processor.

use std::sync::Arc;

use axum::{
    extract::Extension,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::app::{errors, services::AppServices};

pub fn router() -> Router {
    Router::new()
        .route("/stats", get(queue_stats))
        .route("/check", post(check_and_process))
        .route("/trigger", post(trigger_processing))
        .route("/retry", post(retry_failed_jobs))
}

/// GET /admin/processor/stats - Always 200; a store outage shows up in `error`
pub async fn queue_stats(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    Json(services.processor.queue_stats().await).into_response()
}

pub async fn check_and_process(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.processor.check_and_process().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::processor_error_to_response(e),
    }
}

pub async fn trigger_processing(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.processor.trigger_processing().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::processor_error_to_response(e),
    }
}

pub async fn retry_failed_jobs(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.processor.retry_failed_jobs().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::processor_error_to_response(e),
    }
}
