// handlers/protected/posts.rs - Post composition, scheduling and publication

use axum::{extract::State, Extension};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::database::models::Post;
use crate::handlers::extract::{Json, Path, Query};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::post_service::{CreatePost, UpdatePost};
use crate::services::{PostService, PublishService};
use crate::state::AppState;
use crate::types::PostStatus;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<PostStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub scheduled_at: DateTime<Utc>,
}

/// GET /api/posts?status=
pub async fn posts_get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<Post>> {
    Ok(ApiResponse::success(PostService::new(state).list(user.id, query.status).await?))
}

/// POST /api/posts
pub async fn posts_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(input): Json<CreatePost>,
) -> ApiResult<Post> {
    Ok(ApiResponse::created(PostService::new(state).create(user.id, input).await?))
}

/// GET /api/posts/:id
pub async fn post_get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Post> {
    Ok(ApiResponse::success(PostService::new(state).owned(user.id, id).await?))
}

/// PATCH /api/posts/:id
pub async fn post_patch(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdatePost>,
) -> ApiResult<Post> {
    Ok(ApiResponse::success(PostService::new(state).update(user.id, id, input).await?))
}

/// DELETE /api/posts/:id
pub async fn post_delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    PostService::new(state).delete(user.id, id).await?;
    Ok(ApiResponse::no_content())
}

/// POST /api/posts/:id/schedule
pub async fn post_schedule(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<ScheduleRequest>,
) -> ApiResult<Post> {
    let post = PostService::new(state)
        .schedule(user.id, id, request.scheduled_at)
        .await?;
    Ok(ApiResponse::success(post))
}

/// POST /api/posts/:id/unschedule
pub async fn post_unschedule(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Post> {
    Ok(ApiResponse::success(PostService::new(state).unschedule(user.id, id).await?))
}

/// POST /api/posts/:id/cancel
pub async fn post_cancel(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Post> {
    Ok(ApiResponse::success(PostService::new(state).cancel(user.id, id).await?))
}

/// POST /api/posts/:id/publish - publish now; a failed attempt still answers 200 with the failed post
pub async fn post_publish(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Post> {
    Ok(ApiResponse::success(PublishService::new(state).publish_now(user.id, id).await?))
}
