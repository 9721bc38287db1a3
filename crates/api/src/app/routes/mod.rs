use axum::Router;

pub mod jobs;
pub mod processor;
pub mod system;

/// Router for the `/admin` tree.
pub fn router() -> Router {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/processor", processor::router())
}
