use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;

use super::PlatformError;
use crate::types::Platform;

/// Meta error codes meaning "slow down"
const META_RATE_LIMIT_CODES: [i64; 4] = [4, 17, 32, 613];
const META_INVALID_TOKEN_CODE: i64 = 190;
const GOOGLE_RATE_LIMIT_REASONS: [&str; 3] = ["rateLimitExceeded", "userRateLimitExceeded", "quotaExceeded"];
const MAX_MESSAGE_CHARS: usize = 300;

pub fn build_client(timeout: Duration) -> Result<Client, PlatformError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("social-relay-api/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PlatformError::Client(e.to_string()))
}

/// Send a request and decode its JSON body, classifying non-2xx answers
pub async fn send_json(platform: Platform, request: RequestBuilder) -> Result<Value, PlatformError> {
    let response = request.send().await.map_err(|e| transport(platform, e))?;
    let status = response.status();
    let body = read_body(platform, response).await?;

    if status.is_success() {
        Ok(body)
    } else {
        Err(classify(platform, status.as_u16(), &body))
    }
}

/// Send a request and return the raw response when it succeeded
pub async fn send(platform: Platform, request: RequestBuilder) -> Result<Response, PlatformError> {
    let response = request.send().await.map_err(|e| transport(platform, e))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = read_body(platform, response).await?;
    Err(classify(platform, status.as_u16(), &body))
}

async fn read_body(platform: Platform, response: Response) -> Result<Value, PlatformError> {
    let text = response.text().await.map_err(|e| transport(platform, e))?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

pub fn transport(platform: Platform, err: reqwest::Error) -> PlatformError {
    PlatformError::Transport {
        platform,
        message: err.to_string(),
    }
}

#[derive(Debug, Default)]
struct ErrorDetail {
    message: Option<String>,
    code: Option<i64>,
    oauth_error: Option<String>,
    reason: Option<String>,
}

impl ErrorDetail {
    fn from_body(body: &Value) -> Self {
        let mut detail = ErrorDetail::default();

        match body.get("error") {
            // Graph API and Google API style: { "error": { "message", "code", ... } }
            Some(Value::Object(error)) => {
                detail.message = error.get("message").and_then(Value::as_str).map(str::to_string);
                detail.code = error.get("code").and_then(Value::as_i64);
                detail.reason = error
                    .get("errors")
                    .and_then(|e| e.get(0))
                    .and_then(|e| e.get("reason"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
            // OAuth token endpoint style: { "error": "invalid_grant", "error_description": ... }
            Some(Value::String(error)) => {
                detail.oauth_error = Some(error.clone());
                detail.message = body
                    .get("error_description")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| Some(error.clone()));
            }
            _ => {
                detail.message = body
                    .get("error_message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| body.as_str().map(str::to_string));
                detail.code = body.get("code").and_then(Value::as_i64);
            }
        }

        detail
    }
}

/// Map an error answer onto the retry classes
pub fn classify(platform: Platform, status: u16, body: &Value) -> PlatformError {
    let detail = ErrorDetail::from_body(body);
    let message = detail
        .message
        .map(|m| truncate(&m))
        .unwrap_or_else(|| format!("HTTP {}", status));

    let invalid_token = status == 401
        || detail.code == Some(META_INVALID_TOKEN_CODE)
        || detail.oauth_error.as_deref() == Some("invalid_grant");
    let rate_limited = status == 429
        || detail.code.is_some_and(|c| META_RATE_LIMIT_CODES.contains(&c))
        || detail
            .reason
            .as_deref()
            .is_some_and(|r| GOOGLE_RATE_LIMIT_REASONS.contains(&r));

    if invalid_token {
        PlatformError::Unauthorized { platform, message }
    } else if rate_limited {
        PlatformError::RateLimited { platform, message }
    } else if status >= 500 {
        PlatformError::Upstream { platform, message }
    } else if status >= 400 {
        PlatformError::Rejected { platform, message }
    } else {
        PlatformError::InvalidResponse { platform, message }
    }
}

fn truncate(message: &str) -> String {
    if message.chars().count() <= MAX_MESSAGE_CHARS {
        message.to_string()
    } else {
        let mut short: String = message.chars().take(MAX_MESSAGE_CHARS).collect();
        short.push_str("...");
        short
    }
}

/// Read an identifier that platforms send either as a string or a number
pub fn id_field(platform: Platform, body: &Value, key: &str) -> Result<String, PlatformError> {
    match body.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(PlatformError::InvalidResponse {
            platform,
            message: format!("missing '{}'", key),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph_error(code: i64) -> Value {
        json!({ "error": { "message": "boom", "type": "OAuthException", "code": code } })
    }

    #[test]
    fn meta_codes_drive_classification() {
        let p = Platform::Facebook;
        assert!(matches!(classify(p, 400, &graph_error(190)), PlatformError::Unauthorized { .. }));
        assert!(matches!(classify(p, 400, &graph_error(4)), PlatformError::RateLimited { .. }));
        assert!(matches!(classify(p, 403, &graph_error(613)), PlatformError::RateLimited { .. }));
        assert!(matches!(classify(p, 400, &graph_error(100)), PlatformError::Rejected { .. }));
        assert!(matches!(classify(p, 500, &graph_error(2)), PlatformError::Upstream { .. }));
    }

    #[test]
    fn google_errors() {
        let p = Platform::YouTube;
        let grant = json!({ "error": "invalid_grant", "error_description": "Token has been expired or revoked." });
        match classify(p, 400, &grant) {
            PlatformError::Unauthorized { message, .. } => assert_eq!(message, "Token has been expired or revoked."),
            other => panic!("unexpected {other:?}"),
        }

        let quota = json!({ "error": { "code": 403, "message": "quota", "errors": [{ "reason": "quotaExceeded" }] } });
        assert!(matches!(classify(p, 403, &quota), PlatformError::RateLimited { .. }));
        assert!(matches!(classify(p, 429, &Value::Null), PlatformError::RateLimited { .. }));
        assert!(matches!(classify(p, 503, &Value::Null), PlatformError::Upstream { .. }));
    }

    #[test]
    fn message_falls_back_to_status_and_is_truncated() {
        match classify(Platform::Instagram, 404, &Value::Null) {
            PlatformError::Rejected { message, .. } => assert_eq!(message, "HTTP 404"),
            other => panic!("unexpected {other:?}"),
        }

        let long = Value::String("x".repeat(1000));
        match classify(Platform::Instagram, 400, &long) {
            PlatformError::Rejected { message, .. } => assert!(message.len() < 400),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn id_field_accepts_numbers() {
        let body = json!({ "user_id": 17841400000000000u64, "id": "abc", "empty": "" });
        assert_eq!(id_field(Platform::Instagram, &body, "user_id").unwrap(), "17841400000000000");
        assert_eq!(id_field(Platform::Instagram, &body, "id").unwrap(), "abc");
        assert!(id_field(Platform::Instagram, &body, "empty").is_err());
    }
}
