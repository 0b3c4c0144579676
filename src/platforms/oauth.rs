// Authorization code flow helpers shared by the platform clients.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde_json::Value;
use sha2::{Digest, Sha256};
use url::Url;

use super::PlatformError;
use crate::types::Platform;

/// Tokens returned by a token endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

impl TokenSet {
    /// Parse a token endpoint answer. `expires_in` may arrive as a number or a string;
    /// `scope` may be space or comma separated.
    pub fn from_response(platform: Platform, body: &Value, now: DateTime<Utc>) -> Result<Self, PlatformError> {
        let access_token = body
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PlatformError::InvalidResponse {
                platform,
                message: "token response without access_token".to_string(),
            })?
            .to_string();

        let expires_in = match body.get("expires_in") {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        };

        let scopes = body
            .get("scope")
            .and_then(Value::as_str)
            .map(|s| {
                s.split(|c: char| c == ' ' || c == ',')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            access_token,
            refresh_token: body
                .get("refresh_token")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            // zero means "does not expire" on Meta long-lived tokens
            expires_at: expires_in.filter(|s| *s > 0).map(|s| now + Duration::seconds(s)),
            scopes,
        })
    }

    pub fn with_default_scopes(mut self, scopes: &[String]) -> Self {
        if self.scopes.is_empty() {
            self.scopes = scopes.to_vec();
        }
        self
    }
}

fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// 32 random bytes, URL-safe
pub fn generate_state() -> String {
    random_token(32)
}

pub fn generate_code_verifier() -> String {
    random_token(32)
}

/// PKCE S256: base64url(SHA-256(verifier)) without padding
pub fn code_challenge(code_verifier: &str) -> String {
    let hash = Sha256::digest(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Parameters of an authorization redirect
pub struct AuthorizeRequest<'a> {
    pub endpoint: &'a str,
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub scopes: &'a [String],
    pub scope_separator: &'a str,
    pub state: &'a str,
    pub code_verifier: Option<&'a str>,
    pub extra: &'a [(&'a str, &'a str)],
}

impl AuthorizeRequest<'_> {
    pub fn build(&self, platform: Platform) -> Result<Url, PlatformError> {
        let mut url = Url::parse(self.endpoint).map_err(|e| PlatformError::InvalidResponse {
            platform,
            message: format!("invalid authorize endpoint: {e}"),
        })?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", self.client_id)
                .append_pair("redirect_uri", self.redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("scope", &self.scopes.join(self.scope_separator))
                .append_pair("state", self.state);

            if let Some(verifier) = self.code_verifier {
                query
                    .append_pair("code_challenge", &code_challenge(verifier))
                    .append_pair("code_challenge_method", "S256");
            }

            for (key, value) in self.extra {
                query.append_pair(key, value);
            }
        }

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn code_challenge_matches_rfc7636_vector() {
        assert_eq!(
            code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn state_is_url_safe_and_unique() {
        let a = generate_state();
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(a, generate_state());
    }

    #[test]
    fn parses_token_response() {
        let now = Utc::now();
        let body = json!({
            "access_token": "ya29.token",
            "expires_in": 3599,
            "refresh_token": "1//refresh",
            "scope": "https://www.googleapis.com/auth/youtube.upload https://www.googleapis.com/auth/youtube.readonly",
            "token_type": "Bearer"
        });
        let tokens = TokenSet::from_response(Platform::YouTube, &body, now).unwrap();
        assert_eq!(tokens.access_token, "ya29.token");
        assert_eq!(tokens.refresh_token.as_deref(), Some("1//refresh"));
        assert_eq!(tokens.expires_at, Some(now + Duration::seconds(3599)));
        assert_eq!(tokens.scopes.len(), 2);
    }

    #[test]
    fn string_expiry_and_missing_token() {
        let now = Utc::now();
        let body = json!({ "access_token": "IGQV", "expires_in": "5183944" });
        let tokens = TokenSet::from_response(Platform::Instagram, &body, now).unwrap();
        assert_eq!(tokens.expires_at, Some(now + Duration::seconds(5183944)));
        assert!(tokens.refresh_token.is_none());

        let never = json!({ "access_token": "EAA", "expires_in": 0 });
        assert!(TokenSet::from_response(Platform::Facebook, &never, now).unwrap().expires_at.is_none());

        assert!(TokenSet::from_response(Platform::Facebook, &json!({}), now).is_err());
    }

    #[test]
    fn authorize_url_carries_pkce_and_extras() {
        let scopes = vec!["a".to_string(), "b".to_string()];
        let url = AuthorizeRequest {
            endpoint: "https://accounts.example.com/auth",
            client_id: "client",
            redirect_uri: "http://localhost/cb",
            scopes: &scopes,
            scope_separator: " ",
            state: "xyz",
            code_verifier: Some("verifier"),
            extra: &[("access_type", "offline")],
        }
        .build(Platform::YouTube)
        .unwrap();

        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["scope"], "a b");
        assert_eq!(pairs["state"], "xyz");
        assert_eq!(pairs["code_challenge"], code_challenge("verifier"));
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["access_type"], "offline");
    }
}
