use axum::{extract::State, Extension};

use crate::database::models::UserView;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::AuthService;
use crate::state::AppState;

/// GET /api/auth/whoami - the user behind the bearer token
pub async fn whoami(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> ApiResult<UserView> {
    let view = AuthService::new(state).whoami(user.id).await?;
    Ok(ApiResponse::success(view))
}
