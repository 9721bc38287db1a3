//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: job store, orchestrator, lifecycle and processor wiring
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{build_services, AppServices};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<AppServices>, admin_token: Option<String>) -> Router {
    let auth_state = middleware::AdminAuthState::new(admin_token.as_deref());

    let admin = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::admin_auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/admin", admin)
        .layer(ServiceBuilder::new())
}
