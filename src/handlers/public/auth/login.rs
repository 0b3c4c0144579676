use axum::extract::State;

use crate::handlers::extract::Json;

use crate::middleware::{ApiResponse, ApiResult};
use crate::services::auth_service::{LoginRequest, Session};
use crate::services::AuthService;
use crate::state::AppState;

/// POST /auth/login - exchange email and password for a JWT
pub async fn login_post(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> ApiResult<Session> {
    let session = AuthService::new(state).login(request).await?;
    Ok(ApiResponse::success(session))
}
