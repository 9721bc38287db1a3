//! Admin bearer-token guard.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

use crate::app::errors;

type TokenDigest = [u8; 32];

#[derive(Clone)]
pub struct AdminAuthState {
    /// SHA-256 of the admin token. `None` leaves the admin routes open.
    token_digest: Option<TokenDigest>,
}

impl AdminAuthState {
    pub fn new(token: Option<&str>) -> Self {
        Self {
            token_digest: token.map(digest),
        }
    }

    /// Compares digests over their full length so the time taken does not
    /// depend on how many leading bytes match.
    fn accepts(&self, presented: &str) -> bool {
        match &self.token_digest {
            Some(expected) => digest(presented)
                .iter()
                .zip(expected.iter())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0,
            None => true,
        }
    }
}

fn digest(token: &str) -> TokenDigest {
    Sha256::digest(token.as_bytes()).into()
}

pub async fn admin_auth_middleware(
    State(state): State<AdminAuthState>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    if state.token_digest.is_none() {
        return next.run(req).await;
    }

    match extract_bearer(req.headers()) {
        Ok(token) if state.accepts(token) => next.run(req).await,
        _ => errors::json_error(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid admin token",
        ),
    }
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}
