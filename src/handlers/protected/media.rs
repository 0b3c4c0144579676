use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{header, HeaderMap},
    Extension,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::database::models::MediaObject;
use crate::error::ApiError;
use crate::handlers::extract::{Path, Query};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::MediaService;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    pub file_name: Option<String>,
}

/// POST /api/media - raw body upload, typed by the Content-Type header
pub async fn media_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<MediaObject> {
    let body = body?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("Content-Type header is required"))?;

    let media = MediaService::new(state)
        .upload(user.id, content_type, &body, query.file_name)
        .await?;
    Ok(ApiResponse::created(media))
}

/// GET /api/media
pub async fn media_list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Vec<MediaObject>> {
    Ok(ApiResponse::success(MediaService::new(state).list(user.id).await?))
}

/// DELETE /api/media/:id
pub async fn media_delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    MediaService::new(state).delete(user.id, id).await?;
    Ok(ApiResponse::no_content())
}
