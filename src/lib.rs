pub mod auth;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod platforms;
pub mod services;
pub mod state;
pub mod types;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{protected, public};
use crate::middleware::jwt_auth_middleware;
use crate::state::AppState;

/// Full HTTP surface: public routes, JWT-protected `/api` routes and global layers
pub fn app(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/", get(public::root::root_get))
        .route("/health", get(public::root::health_get))
        .merge(public_routes())
        // Protected API
        .merge(protected_routes(&state))
        // Global middleware, outermost first
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config.security.cors_origins))
                .layer(DefaultBodyLimit::max(state.config.server.max_request_bytes)),
        )
        .with_state(state)
}

fn public_routes() -> Router<AppState> {
    use public::{auth, media, oauth};

    Router::new()
        .route("/auth/register", post(auth::register_post))
        .route("/auth/login", post(auth::login_post))
        .route("/oauth/:platform/callback", get(oauth::callback_get))
        .route("/media/*key", get(media::media_get))
}

fn protected_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(auth_routes())
        .merge(account_routes())
        .merge(media_routes(state.config.media.max_upload_bytes))
        .merge(post_routes())
        .route_layer(from_fn_with_state(state.clone(), jwt_auth_middleware))
}

fn auth_routes() -> Router<AppState> {
    use protected::{auth, connect};

    Router::new()
        .route("/api/auth/whoami", get(auth::session_whoami))
        .route("/api/connect/:platform", post(connect::connect_post))
}

fn account_routes() -> Router<AppState> {
    use protected::accounts;

    Router::new()
        .route("/api/accounts", get(accounts::accounts_get))
        .route(
            "/api/accounts/:id",
            get(accounts::account_get).delete(accounts::account_delete),
        )
        .route("/api/accounts/:id/refresh", post(accounts::account_refresh_post))
}

fn media_routes(max_upload_bytes: usize) -> Router<AppState> {
    use protected::media;

    Router::new()
        .route(
            "/api/media",
            post(media::media_post)
                .layer(DefaultBodyLimit::max(max_upload_bytes))
                .get(media::media_list),
        )
        .route("/api/media/:id", axum::routing::delete(media::media_delete))
}

fn post_routes() -> Router<AppState> {
    use protected::posts;

    Router::new()
        .route("/api/posts", get(posts::posts_get).post(posts::posts_post))
        .route(
            "/api/posts/:id",
            get(posts::post_get).patch(posts::post_patch).delete(posts::post_delete),
        )
        .route("/api/posts/:id/schedule", post(posts::post_schedule))
        .route("/api/posts/:id/unschedule", post(posts::post_unschedule))
        .route("/api/posts/:id/cancel", post(posts::post_cancel))
        .route("/api/posts/:id/publish", post(posts::post_publish))
}

/// `*` allows any origin; otherwise only the listed origins
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o.trim_end_matches('/')).ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::database::MemoryStore;
    use crate::platforms::PlatformClients;
    use crate::services::LocalMediaStore;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn router() -> Router {
        let config = AppConfig::development();
        let root = std::env::temp_dir().join(format!("relay-router-{}", uuid::Uuid::new_v4()));
        let media = LocalMediaStore::open(root).await.unwrap();
        let platforms = PlatformClients::new(&config.platforms).unwrap();
        app(AppState::new(config, Arc::new(MemoryStore::new()), Arc::new(media), platforms))
    }

    #[tokio::test]
    async fn health_is_public() {
        let response = router()
            .await
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn api_rejects_missing_token_with_envelope() {
        let response = router()
            .await
            .oneshot(Request::get("/api/posts").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn cors_allows_only_configured_origins() {
        let request = |origin: &'static str| {
            Request::builder()
                .method("OPTIONS")
                .uri("/api/posts")
                .header("origin", origin)
                .header("access-control-request-method", "GET")
                .body(Body::empty())
                .unwrap()
        };

        let allowed = router().await.oneshot(request("http://localhost:5173")).await.unwrap();
        assert_eq!(
            allowed.headers().get("access-control-allow-origin").map(|v| v.as_bytes()),
            Some(&b"http://localhost:5173"[..])
        );

        let denied = router().await.oneshot(request("https://evil.example")).await.unwrap();
        assert!(denied.headers().get("access-control-allow-origin").is_none());
    }
}
