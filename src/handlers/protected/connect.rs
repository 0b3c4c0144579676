use axum::{extract::State, Extension};
use serde::Deserialize;

use crate::handlers::extract::{Json, Path};
use crate::handlers::public::oauth::parse_platform;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::connect_service::ConnectStart;
use crate::services::ConnectService;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ConnectRequest {
    /// Frontend URL to return to once the callback completes
    pub redirect_after: Option<String>,
}

/// POST /api/connect/:platform - start the authorization code flow
pub async fn connect_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(platform): Path<String>,
    body: Option<Json<ConnectRequest>>,
) -> ApiResult<ConnectStart> {
    let platform = parse_platform(&platform)?;
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let start = ConnectService::new(state)
        .begin_connect(user.id, platform, request.redirect_after)
        .await?;
    Ok(ApiResponse::success(start))
}
