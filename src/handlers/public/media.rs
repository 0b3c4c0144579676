use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::handlers::extract::Path;
use crate::services::media_service::content_type_for_key;
use crate::state::AppState;

/// GET /media/*key - uploaded media, fetched by the platforms when publishing
pub async fn media_get(State(state): State<AppState>, Path(key): Path<String>) -> Result<Response, ApiError> {
    let bytes = state.media.get(&key).await?;
    let content_type = content_type_for_key(&key).unwrap_or("application/octet-stream");

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "public, max-age=86400"),
        ],
        bytes,
    )
        .into_response())
}
