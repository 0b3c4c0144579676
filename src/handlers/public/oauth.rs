use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use url::Url;

use crate::error::ApiError;
use crate::handlers::extract::{Path, Query};
use crate::middleware::ApiResponse;
use crate::services::connect_service::CallbackParams;
use crate::services::ConnectService;
use crate::state::AppState;
use crate::types::Platform;

pub fn parse_platform(raw: &str) -> Result<Platform, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::not_found(format!("Unknown platform '{}'", raw)))
}

/// Append `connected=<platform>` to the frontend URL the user asked to return to
fn redirect_location(target: &str, platform: Platform) -> Option<String> {
    let mut url = Url::parse(target).ok()?;
    url.query_pairs_mut().append_pair("connected", platform.as_str());
    Some(url.to_string())
}

/// GET /oauth/:platform/callback - provider redirect after consent
pub async fn callback_get(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
    let platform = parse_platform(&platform)?;
    let result = ConnectService::new(state).complete_connect(platform, params).await?;

    if let Some(location) = result.redirect_after.as_deref().and_then(|t| redirect_location(t, platform)) {
        return Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response());
    }
    Ok(ApiResponse::success(result).into_response())
}
