use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

use super::http::{id_field, send, send_json};
use super::oauth::{AuthorizeRequest, TokenSet};
use super::{ConnectedIdentity, MediaPayload, OAuthProvider, PlatformError, PublishOutcome, Publisher};
use crate::config::YouTubeConfig;
use crate::database::models::{ConnectedAccount, Post};
use crate::types::{Platform, PostKind};

const PLATFORM: Platform = Platform::YouTube;
pub const DEFAULT_PRIVACY: &str = "public";

/// YouTube Data API client using Google OAuth with PKCE and resumable uploads
pub struct YouTubeClient {
    http: Client,
    config: YouTubeConfig,
}

impl YouTubeClient {
    pub fn new(http: Client, config: YouTubeConfig) -> Self {
        Self { http, config }
    }

    fn api(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_url.trim_end_matches('/'), path)
    }

    fn video_resource(&self, post: &Post) -> Value {
        json!({
            "snippet": {
                "title": post.title.as_deref().unwrap_or_default(),
                "description": post.body.as_deref().unwrap_or_default(),
                "categoryId": self.config.category_id,
            },
            "status": {
                "privacyStatus": post.privacy.as_deref().unwrap_or(DEFAULT_PRIVACY),
                "selfDeclaredMadeForKids": false,
            }
        })
    }

    /// Open a resumable upload session and return its URI
    async fn start_upload(
        &self,
        token: &str,
        post: &Post,
        media: &MediaPayload,
    ) -> Result<String, PlatformError> {
        let url = format!(
            "{}/videos?uploadType=resumable&part=snippet,status",
            self.config.upload_url.trim_end_matches('/')
        );
        let request = self
            .http
            .post(url)
            .bearer_auth(token)
            .header("X-Upload-Content-Type", media.content_type.as_str())
            .header("X-Upload-Content-Length", media.bytes.len().to_string())
            .json(&self.video_resource(post));

        let response = send(PLATFORM, request).await?;
        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PlatformError::InvalidResponse {
                platform: PLATFORM,
                message: "upload session without Location header".to_string(),
            })
    }
}

#[async_trait]
impl OAuthProvider for YouTubeClient {
    fn platform(&self) -> Platform {
        PLATFORM
    }

    fn is_configured(&self) -> bool {
        !self.config.client_id.is_empty() && !self.config.client_secret.is_empty()
    }

    fn uses_pkce(&self) -> bool {
        true
    }

    fn authorize_url(&self, state: &str, code_verifier: Option<&str>) -> Result<Url, PlatformError> {
        AuthorizeRequest {
            endpoint: &self.config.authorize_url,
            client_id: &self.config.client_id,
            redirect_uri: &self.config.redirect_uri,
            scopes: &self.config.scopes,
            scope_separator: " ",
            state,
            code_verifier,
            // offline + consent so Google always returns a refresh token
            extra: &[
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("include_granted_scopes", "true"),
            ],
        }
        .build(PLATFORM)
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Vec<ConnectedIdentity>, PlatformError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier));
        }
        let body = send_json(PLATFORM, self.http.post(&self.config.token_url).form(&form)).await?;
        let tokens = TokenSet::from_response(PLATFORM, &body, Utc::now())?.with_default_scopes(&self.config.scopes);

        let request = self
            .http
            .get(self.api("channels"))
            .query(&[("part", "snippet"), ("mine", "true")])
            .bearer_auth(&tokens.access_token);
        let body = send_json(PLATFORM, request).await?;
        let channels = body.get("items").and_then(Value::as_array).cloned().unwrap_or_default();

        if channels.is_empty() {
            return Err(PlatformError::Rejected {
                platform: PLATFORM,
                message: "the Google account has no YouTube channel".to_string(),
            });
        }

        let identities = channels
            .iter()
            .map(|channel| -> Result<ConnectedIdentity, PlatformError> {
                let id = id_field(PLATFORM, channel, "id")?;
                let title = channel
                    .pointer("/snippet/title")
                    .and_then(Value::as_str)
                    .unwrap_or(id.as_str())
                    .to_string();
                Ok(ConnectedIdentity {
                    platform_account_id: id,
                    display_name: title,
                    tokens: tokens.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!("YouTube authorization granted {} channel(s)", identities.len());
        Ok(identities)
    }

    async fn refresh(&self, account: &ConnectedAccount) -> Result<TokenSet, PlatformError> {
        let refresh_token = account.refresh_token.as_deref().ok_or_else(|| PlatformError::Unauthorized {
            platform: PLATFORM,
            message: "no refresh token stored".to_string(),
        })?;

        let request = self.http.post(&self.config.token_url).form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ]);
        let body = send_json(PLATFORM, request).await?;
        let mut tokens = TokenSet::from_response(PLATFORM, &body, Utc::now())?.with_default_scopes(&account.scopes);
        // Google rarely rotates refresh tokens
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = Some(refresh_token.to_string());
        }
        Ok(tokens)
    }
}

#[async_trait]
impl Publisher for YouTubeClient {
    fn needs_media_bytes(&self, _post: &Post) -> bool {
        true
    }

    async fn publish(
        &self,
        account: &ConnectedAccount,
        post: &Post,
        media: Option<MediaPayload>,
    ) -> Result<PublishOutcome, PlatformError> {
        if post.kind != PostKind::Video {
            return Err(PlatformError::Unsupported {
                platform: PLATFORM,
                what: format!("{} posts", post.kind),
            });
        }
        let media = media.ok_or_else(|| PlatformError::Rejected {
            platform: PLATFORM,
            message: "video bytes are required".to_string(),
        })?;

        let token = account.access_token.as_str();
        let session = self.start_upload(token, post, &media).await?;
        debug!("Opened YouTube upload session for post {} ({} bytes)", post.id, media.bytes.len());

        let request = self
            .http
            .put(session)
            .bearer_auth(token)
            .header(CONTENT_TYPE, media.content_type.as_str())
            .body(media.bytes);
        let body = send_json(PLATFORM, request).await?;
        let video_id = id_field(PLATFORM, &body, "id")?;
        info!("Uploaded post {} to YouTube as video {}", post.id, video_id);

        Ok(PublishOutcome {
            permalink: Some(format!("https://www.youtube.com/watch?v={}", video_id)),
            platform_post_id: video_id,
            container_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use uuid::Uuid;

    fn client() -> YouTubeClient {
        let mut config = AppConfig::development().platforms.youtube;
        config.client_id = "google-client".to_string();
        config.client_secret = "google-secret".to_string();
        YouTubeClient::new(Client::new(), config)
    }

    #[test]
    fn authorize_url_requests_offline_access_with_pkce() {
        let url = client().authorize_url("st", Some("verifier")).unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["prompt"], "consent");
        assert_eq!(pairs["include_granted_scopes"], "true");
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert!(pairs["scope"].contains("youtube.upload"));
    }

    #[test]
    fn video_resource_defaults_privacy() {
        let mut post = Post::new(Uuid::new_v4(), Uuid::new_v4(), Platform::YouTube, PostKind::Video, Utc::now());
        post.title = Some("Launch".to_string());
        post.body = Some("All the details".to_string());

        let resource = client().video_resource(&post);
        assert_eq!(resource["snippet"]["title"], "Launch");
        assert_eq!(resource["snippet"]["categoryId"], "22");
        assert_eq!(resource["status"]["privacyStatus"], "public");
        assert_eq!(resource["status"]["selfDeclaredMadeForKids"], false);

        post.privacy = Some("unlisted".to_string());
        assert_eq!(client().video_resource(&post)["status"]["privacyStatus"], "unlisted");
    }
}
