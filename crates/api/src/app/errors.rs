use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use docportal_core::DomainError;
use docportal_infra::jobs::{JobStoreError, LifecycleError, ProcessorError};

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::InvalidTransition { .. } => {
            json_error(StatusCode::CONFLICT, "invalid_transition", err.to_string())
        }
        DomainError::Validation(_) | DomainError::InvalidId(_) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", err.to_string())
        }
    }
}

pub fn store_error_to_response(err: JobStoreError) -> axum::response::Response {
    match err {
        JobStoreError::AlreadyExists(_) => {
            json_error(StatusCode::CONFLICT, "conflict", err.to_string())
        }
        JobStoreError::Domain(e) => domain_error_to_response(e),
        JobStoreError::Unavailable(_) | JobStoreError::Storage(_) => {
            tracing::error!(error = %err, "job store error");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", err.to_string())
        }
    }
}

pub fn lifecycle_error_to_response(err: LifecycleError) -> axum::response::Response {
    match err {
        LifecycleError::NotQueued(_) => {
            json_error(StatusCode::NOT_FOUND, "not_found", err.to_string())
        }
        LifecycleError::ExtractionFailed(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "processing_failed", msg)
        }
        LifecycleError::Store(e) => store_error_to_response(e),
    }
}

pub fn processor_error_to_response(err: ProcessorError) -> axum::response::Response {
    match err {
        ProcessorError::Http(_) | ProcessorError::Status { .. } | ProcessorError::Decode(_) => {
            json_error(StatusCode::BAD_GATEWAY, "edge_function_error", err.to_string())
        }
        ProcessorError::Store(e) => store_error_to_response(e),
    }
}
