use axum::{extract::State, Extension};
use serde::Serialize;
use uuid::Uuid;

use crate::database::models::AccountView;
use crate::handlers::extract::Path;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::AccountService;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Disconnected {
    pub id: Uuid,
    pub cancelled_posts: u64,
}

/// GET /api/accounts
pub async fn accounts_get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Vec<AccountView>> {
    Ok(ApiResponse::success(AccountService::new(state).list(user.id).await?))
}

/// GET /api/accounts/:id
pub async fn account_get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<AccountView> {
    Ok(ApiResponse::success(AccountService::new(state).get(user.id, id).await?))
}

/// DELETE /api/accounts/:id - disconnect; scheduled posts on it are cancelled
pub async fn account_delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Disconnected> {
    let cancelled_posts = AccountService::new(state).disconnect(user.id, id).await?;
    Ok(ApiResponse::success(Disconnected { id, cancelled_posts }))
}

/// POST /api/accounts/:id/refresh - force a token refresh
pub async fn account_refresh_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<AccountView> {
    Ok(ApiResponse::success(AccountService::new(state).refresh(user.id, id).await?))
}
