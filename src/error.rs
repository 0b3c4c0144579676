// HTTP API Error Types
use axum::{
    extract::rejection::{BytesRejection, JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::auth::AuthError;
use crate::database::DatabaseError;
use crate::platforms::PlatformError;
use crate::services::error::ServiceError;
use crate::services::media_service::MediaError;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    InvalidJson(String),
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },
    InvalidOAuthState(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),
    InvalidTransition(String),
    ReauthRequired(String),

    // 422 Unprocessable Entity
    UnprocessableEntity {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },

    // 413 Payload Too Large
    PayloadTooLarge(String),

    // 415 Unsupported Media Type
    UnsupportedMediaType(String),

    // 429 Too Many Requests
    TooManyRequests(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 502 Bad Gateway (platform failures)
    BadGateway(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::InvalidJson(_) => 400,
            ApiError::ValidationError { .. } => 400,
            ApiError::InvalidOAuthState(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::InvalidTransition(_) => 409,
            ApiError::ReauthRequired(_) => 409,
            ApiError::PayloadTooLarge(_) => 413,
            ApiError::UnsupportedMediaType(_) => 415,
            ApiError::UnprocessableEntity { .. } => 422,
            ApiError::TooManyRequests(_) => 429,
            ApiError::InternalServerError(_) => 500,
            ApiError::BadGateway(_) => 502,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::InvalidJson(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
            ApiError::InvalidOAuthState(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::InvalidTransition(msg) => msg,
            ApiError::ReauthRequired(msg) => msg,
            ApiError::PayloadTooLarge(msg) => msg,
            ApiError::UnsupportedMediaType(msg) => msg,
            ApiError::UnprocessableEntity { message, .. } => message,
            ApiError::TooManyRequests(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::BadGateway(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::InvalidJson(_) => "INVALID_JSON",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::InvalidOAuthState(_) => "INVALID_OAUTH_STATE",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InvalidTransition(_) => "INVALID_TRANSITION",
            ApiError::ReauthRequired(_) => "REAUTH_REQUIRED",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            ApiError::UnprocessableEntity { .. } => "UNPROCESSABLE_ENTITY",
            ApiError::TooManyRequests(_) => "TOO_MANY_REQUESTS",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::BadGateway(_) => "BAD_GATEWAY",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "success": false,
            "error": self.message(),
            "code": self.error_code()
        });

        match self {
            ApiError::ValidationError { field_errors: Some(field_errors), .. }
            | ApiError::UnprocessableEntity { field_errors: Some(field_errors), .. } => {
                body["field_errors"] = json!(field_errors);
            }
            _ => {}
        }

        body
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(message: impl Into<String>, field_errors: Option<HashMap<String, String>>) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        ApiError::InvalidJson(message.into())
    }

    pub fn unprocessable_entity(message: impl Into<String>, field_errors: Option<HashMap<String, String>>) -> Self {
        ApiError::UnprocessableEntity {
            message: message.into(),
            field_errors,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        ApiError::BadGateway(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Convert other error types to ApiError
impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => ApiError::not_found(msg),
            DatabaseError::Conflict(msg) => ApiError::conflict(msg),
            DatabaseError::ConfigMissing(_) | DatabaseError::InvalidDatabaseUrl => {
                tracing::error!("Database misconfigured: {}", err);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            DatabaseError::MigrationError(msg) => {
                tracing::error!("Migration error: {}", msg);
                ApiError::service_unavailable("Service is being updated, please try again later")
            }
            DatabaseError::CorruptRow(msg) => {
                tracing::error!("Corrupt row: {}", msg);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            DatabaseError::Sqlx(sqlx_err) => {
                // Log the real error but return generic message
                tracing::error!("SQLx error: {}", sqlx_err);
                ApiError::internal_server_error("Database error occurred")
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::unauthorized(err.to_string()),
            AuthError::InvalidToken(_) | AuthError::MissingToken(_) => ApiError::unauthorized(err.to_string()),
            AuthError::MissingSecret | AuthError::TokenGeneration(_) | AuthError::PasswordHash(_) => {
                tracing::error!("Auth failure: {}", err);
                ApiError::internal_server_error("Authentication is unavailable")
            }
        }
    }
}

impl From<PlatformError> for ApiError {
    fn from(err: PlatformError) -> Self {
        match &err {
            PlatformError::NotConfigured(_) => ApiError::service_unavailable(err.to_string()),
            PlatformError::RateLimited { .. } => ApiError::TooManyRequests(err.to_string()),
            PlatformError::Unauthorized { .. } => ApiError::ReauthRequired(err.to_string()),
            PlatformError::Unsupported { .. } => ApiError::bad_request(err.to_string()),
            _ => {
                tracing::warn!("Platform error: {}", err);
                ApiError::bad_gateway(err.to_string())
            }
        }
    }
}

impl From<MediaError> for ApiError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::TooLarge { .. } => ApiError::PayloadTooLarge(err.to_string()),
            MediaError::UnsupportedType(_) => ApiError::UnsupportedMediaType(err.to_string()),
            MediaError::InvalidKey(_) | MediaError::NotFound(_) => ApiError::not_found(err.to_string()),
            MediaError::Fetch(_) => ApiError::bad_gateway(err.to_string()),
            MediaError::Io(io_err) => {
                tracing::error!("Media storage error: {}", io_err);
                ApiError::internal_server_error("Media storage error")
            }
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => ApiError::validation_error(msg, None),
            ServiceError::FieldErrors(field_errors) => {
                ApiError::validation_error("Validation failed", Some(field_errors))
            }
            ServiceError::NotFound(msg) => ApiError::not_found(msg),
            ServiceError::Conflict(msg) => ApiError::conflict(msg),
            ServiceError::InvalidTransition { .. } => ApiError::InvalidTransition(err.to_string()),
            ServiceError::OAuthState(msg) => ApiError::InvalidOAuthState(msg),
            ServiceError::ProviderDenied(msg) => ApiError::bad_request(msg),
            ServiceError::ReauthRequired(msg) => ApiError::ReauthRequired(msg),
            ServiceError::Database(e) => e.into(),
            ServiceError::Platform(e) => e.into(),
            ServiceError::Media(e) => e.into(),
            ServiceError::Auth(e) => e.into(),
        }
    }
}

// Extractor rejections, so malformed requests still get the JSON envelope
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = rejection.body_text();
        match rejection.status() {
            StatusCode::UNPROCESSABLE_ENTITY => ApiError::unprocessable_entity(message, None),
            StatusCode::UNSUPPORTED_MEDIA_TYPE => ApiError::UnsupportedMediaType(message),
            StatusCode::PAYLOAD_TOO_LARGE => ApiError::PayloadTooLarge(message),
            _ => ApiError::invalid_json(message),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        if rejection.status().is_server_error() {
            tracing::error!("Path extraction failed: {}", rejection.body_text());
            return ApiError::internal_server_error("Route is misconfigured");
        }
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => ApiError::PayloadTooLarge(rejection.body_text()),
            _ => ApiError::bad_request(rejection.body_text()),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
