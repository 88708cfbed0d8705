pub mod middleware;
pub mod rate_limit;

use crate::config::ServerConfig;
use crate::domains::export::ExportService;
use crate::errors::{ServiceError, ServiceResult};
use crate::validation::ExportQuery;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::{error, info};
use rate_limit::RateLimiter;
use std::sync::Arc;

// ── App State ──

pub struct AppState {
    pub export: ExportService,
    pub auth_token: String,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(export: ExportService, auth_token: &str) -> Self {
        let rate_limiter = RateLimiter::new(export.config().rate_window, export.config().max_requests);
        Self {
            export,
            auth_token: auth_token.to_string(),
            rate_limiter,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(ExportService::new(config.export.clone()), &config.auth_token)
    }
}

// ── Error Handling ──

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let body = serde_json::json!({ "error": self.public_message() });
        (status, Json(body)).into_response()
    }
}

// ── Entrypoint ──

pub async fn serve(config: ServerConfig) -> ServiceResult<()> {
    let state = Arc::new(AppState::from_config(&config));
    let app = router(state);

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Transcript export server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the router (for testing without binding to a port).
pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/export", get(export_transcripts))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
}

// ── Health ──

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

// ── GET /export ──

async fn export_transcripts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ServiceError> {
    let request = query.validate()?;
    let artifact = state.export.export(request).await?;

    let file_name = artifact.file_name.clone();
    let size = artifact.size;
    let stream = artifact.into_stream().await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
            (header::CONTENT_LENGTH, size.to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}
