use crate::errors::ServiceError;
use crate::server::AppState;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use log::warn;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Compare two secrets without short-circuiting on the first differing byte.
///
/// Both sides are hashed first so the comparison length does not depend on the input.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let da = Sha256::digest(a.as_bytes());
    let db = Sha256::digest(b.as_bytes());
    da.iter()
        .zip(db.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Auth middleware: the `Authorization` header must carry the configured token.
///
/// Accepts the bare token or `Bearer <token>`.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v));

    match provided {
        Some(token) if constant_time_eq(token, &state.auth_token) => next.run(request).await,
        Some(_) => {
            warn!("Rejected request: invalid auth token");
            ServiceError::Authentication("invalid auth token".into()).into_response()
        }
        None => {
            warn!("Rejected request: missing auth token");
            ServiceError::Authentication("missing auth token".into()).into_response()
        }
    }
}

/// Rate limiting middleware: excess requests get 429 straight away.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.rate_limiter.check().await {
        warn!("Rate limited request");
        return ServiceError::RateLimitExceeded.into_response();
    }

    next.run(request).await
}
