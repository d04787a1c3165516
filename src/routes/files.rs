use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::post;
use axum::{Json, Router};
use tracing::info;

use crate::models::{AppState, UploadResponse};
use crate::types::AppError;

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;
const UPLOAD_PREFIX: &str = "uploads";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/files", post(upload_file))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Store the first file field of a multipart form
async fn upload_file(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<UploadResponse>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidRequest(e.body_text()))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        if filename.trim().is_empty() {
            return Err(AppError::InvalidRequest("uploaded file has no name".to_string()));
        }

        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| mime_guess::from_path(&filename).first_or_octet_stream().to_string());
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidRequest(e.body_text()))?;
        let size = data.len();

        let url = state.storage.upload_file(UPLOAD_PREFIX, &filename, data.to_vec()).await?;
        info!(url = %url, size, content_type = %content_type, "File uploaded");

        return Ok(Json(UploadResponse {
            download: state.storage.download_link(&url),
            url: url.to_string(),
            filename,
            size,
            content_type,
        }));
    }

    Err(AppError::InvalidRequest("no file in upload".to_string()))
}
