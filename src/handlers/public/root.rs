use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::{json, Value};

use crate::state::AppState;
use crate::types::Platform;

/// GET / - service description and configured platforms
pub async fn root_get(State(state): State<AppState>) -> Json<Value> {
    let platforms: Vec<&str> = Platform::ALL
        .iter()
        .filter(|p| state.platforms.provider(**p).is_configured())
        .map(|p| p.as_str())
        .collect();

    Json(json!({
        "success": true,
        "data": {
            "name": "Social Relay API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "OAuth token lifecycle, publishing and scheduling for Facebook, Instagram and YouTube",
            "platforms": platforms,
            "endpoints": {
                "public_auth": "/auth/register, /auth/login",
                "oauth": "/oauth/:platform/callback",
                "media": "/media/*key",
                "auth": "/api/auth/whoami (protected)",
                "connect": "/api/connect/:platform (protected)",
                "accounts": "/api/accounts[/:id] (protected)",
                "posts": "/api/posts[/:id] (protected)",
            }
        }
    }))
}

/// GET /health - store reachability
pub async fn health_get(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "code": "SERVICE_UNAVAILABLE",
                    "data": {
                        "status": "degraded",
                        "timestamp": now
                    }
                })),
            )
        }
    }
}
