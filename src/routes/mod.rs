//! API Routes
//!
//! - `POST /stream` - one conversation turn as server-sent events
//! - `GET /description` - agent card: tools and pipeline steps
//! - `POST /api/files` - multipart upload into the object store
//! - `GET /api/health` - health check

pub mod description;
pub mod files;
pub mod health;
pub mod stream;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::middleware::cors_layer;
use crate::models::AppState;
use crate::tools::ToolOutput;
use crate::types::AppError;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");
    let cors = cors_layer(&state.config.server.cors_allowed_origins);

    Router::new()
        .merge(stream::router(state.clone()))
        .merge(description::router(state.clone()))
        .merge(files::router(state.clone()))
        .merge(health::router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Every error leaves the API as the same text envelope the tools use
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::LLMApi(_) | AppError::Tool(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(status = %status, error = %self, "Request failed");

        (status, Json(ToolOutput::text(self.to_string()))).into_response()
    }
}
