use axum::extract::State;

use crate::handlers::extract::Json;

use crate::middleware::{ApiResponse, ApiResult};
use crate::services::auth_service::{RegisterRequest, Session};
use crate::services::AuthService;
use crate::state::AppState;

/// POST /auth/register - create a user and return its first session
pub async fn register_post(State(state): State<AppState>, Json(request): Json<RegisterRequest>) -> ApiResult<Session> {
    let session = AuthService::new(state).register(request).await?;
    Ok(ApiResponse::created(session))
}
