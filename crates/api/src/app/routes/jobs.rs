//! Admin routes for extraction jobs.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use docportal_core::{ExtractionJob, JobId};

use crate::app::dto::{self, EnqueueJobRequest, ListJobsQuery, ProcessJobRequest, ProcessJobResponse};
use crate::app::{errors, services::AppServices};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_jobs).post(enqueue_job))
        .route("/process", post(process_job))
        .route("/:id", get(get_job))
        .route("/:id/extraction", get(get_extraction))
}

/// POST /admin/jobs/process - Run one queued job through extraction
pub async fn process_job(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<ProcessJobRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_body",
                rejection.body_text(),
            );
        }
    };

    let Some(raw_id) = body.job_id.filter(|id| !id.trim().is_empty()) else {
        return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "jobId is required");
    };
    let job_id = match JobId::parse(raw_id) {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.lifecycle.process(&job_id).await {
        Ok(processed) => (StatusCode::OK, Json(ProcessJobResponse::from(processed))).into_response(),
        Err(e) => errors::lifecycle_error_to_response(e),
    }
}

/// GET /admin/jobs - List jobs, newest first
pub async fn list_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<ListJobsQuery>, QueryRejection>,
) -> axum::response::Response {
    let filter = match query {
        Ok(Query(q)) => match q.into_filter() {
            Ok(f) => f,
            Err(e) => return errors::domain_error_to_response(e),
        },
        Err(rejection) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_query", rejection.body_text());
        }
    };

    match services.store.list_jobs(&filter).await {
        Ok(jobs) => {
            let jobs: Vec<_> = jobs.iter().map(dto::job_to_json).collect();
            Json(serde_json::json!({ "jobs": jobs })).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

/// POST /admin/jobs - Enqueue a new job
pub async fn enqueue_job(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<EnqueueJobRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text());
        }
    };
    let new = match body.into_new_job() {
        Ok(new) => new,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let job = ExtractionJob::queued(JobId::generate(), new, Utc::now());
    match services.store.insert_job(job.clone()).await {
        Ok(()) => {
            tracing::info!(job_id = %job.id, document_type = %job.document_type, "job enqueued");
            (StatusCode::CREATED, Json(dto::job_to_json(&job))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

/// GET /admin/jobs/:id
pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match JobId::parse(id) {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.store.get_job(&job_id).await {
        Ok(Some(job)) => Json(dto::job_to_json(&job)).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", format!("job {job_id} not found")),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// GET /admin/jobs/:id/extraction
pub async fn get_extraction(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match JobId::parse(id) {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.store.get_extraction(&job_id).await {
        Ok(Some(record)) => Json(dto::extraction_to_json(&record)).into_response(),
        Ok(None) => errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("no extraction record for job {job_id}"),
        ),
        Err(e) => errors::store_error_to_response(e),
    }
}
