use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::http::{id_field, send_json};
use super::oauth::{AuthorizeRequest, TokenSet};
use super::{ConnectedIdentity, MediaPayload, OAuthProvider, PlatformError, PublishOutcome, Publisher};
use crate::config::InstagramConfig;
use crate::database::models::{ConnectedAccount, Post};
use crate::types::{Platform, PostKind};

const PLATFORM: Platform = Platform::Instagram;

/// Processing state of a media container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Finished,
    InProgress,
    Error,
    Expired,
    Published,
}

impl ContainerStatus {
    fn parse(code: &str) -> Option<Self> {
        match code {
            "FINISHED" => Some(Self::Finished),
            "IN_PROGRESS" => Some(Self::InProgress),
            "ERROR" => Some(Self::Error),
            "EXPIRED" => Some(Self::Expired),
            "PUBLISHED" => Some(Self::Published),
            _ => None,
        }
    }
}

/// Instagram API with Instagram Login.
///
/// Publishing is two-phase: create a media container, wait until video
/// containers finish processing, then publish the container.
pub struct InstagramClient {
    http: Client,
    config: InstagramConfig,
}

impl InstagramClient {
    pub fn new(http: Client, config: InstagramConfig) -> Self {
        Self { http, config }
    }

    fn graph(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.graph_url.trim_end_matches('/'),
            self.config.graph_version,
            path.trim_start_matches('/')
        )
    }

    /// Unversioned Instagram Graph endpoint (token exchange and refresh)
    fn graph_root(&self, path: &str) -> String {
        format!("{}/{}", self.config.graph_url.trim_end_matches('/'), path)
    }

    async fn create_container(&self, account: &ConnectedAccount, post: &Post) -> Result<String, PlatformError> {
        let media_url = post.media_url.as_deref().ok_or_else(|| PlatformError::Rejected {
            platform: PLATFORM,
            message: "media_url is required".to_string(),
        })?;
        let caption = post.caption().unwrap_or_default();
        let token = account.access_token.as_str();

        let form: Vec<(&str, &str)> = match post.kind {
            PostKind::Photo => vec![("image_url", media_url), ("caption", caption), ("access_token", token)],
            // Feed videos are published as Reels
            PostKind::Video | PostKind::Reel => vec![
                ("media_type", "REELS"),
                ("video_url", media_url),
                ("caption", caption),
                ("access_token", token),
            ],
            PostKind::Text | PostKind::Link => {
                return Err(PlatformError::Unsupported {
                    platform: PLATFORM,
                    what: format!("{} posts", post.kind),
                })
            }
        };

        let path = format!("{}/media", account.platform_account_id);
        let body = send_json(PLATFORM, self.http.post(self.graph(&path)).form(&form)).await?;
        id_field(PLATFORM, &body, "id")
    }

    async fn container_status(&self, container_id: &str, token: &str) -> Result<ContainerStatus, PlatformError> {
        let request = self
            .http
            .get(self.graph(container_id))
            .query(&[("fields", "status_code"), ("access_token", token)]);
        let body = send_json(PLATFORM, request).await?;
        let code = body.get("status_code").and_then(Value::as_str).unwrap_or_default();
        ContainerStatus::parse(code).ok_or_else(|| PlatformError::InvalidResponse {
            platform: PLATFORM,
            message: format!("unknown container status '{}'", code),
        })
    }

    /// Poll until the container can be published
    async fn wait_for_container(&self, container_id: &str, token: &str) -> Result<(), PlatformError> {
        let interval = Duration::from_millis(self.config.poll_interval_ms);

        for attempt in 1..=self.config.poll_max_attempts {
            match self.container_status(container_id, token).await? {
                ContainerStatus::Finished => return Ok(()),
                ContainerStatus::Published => {
                    return Err(PlatformError::Rejected {
                        platform: PLATFORM,
                        message: format!("container {} was already published", container_id),
                    })
                }
                status @ (ContainerStatus::Error | ContainerStatus::Expired) => {
                    return Err(PlatformError::Rejected {
                        platform: PLATFORM,
                        message: format!("container {} processing ended with {:?}", container_id, status),
                    })
                }
                ContainerStatus::InProgress => {
                    debug!("Container {} still processing (check {})", container_id, attempt);
                    tokio::time::sleep(interval).await;
                }
            }
        }

        Err(PlatformError::Upstream {
            platform: PLATFORM,
            message: format!(
                "container {} not ready after {} checks",
                container_id, self.config.poll_max_attempts
            ),
        })
    }

    async fn permalink(&self, media_id: &str, token: &str) -> Option<String> {
        let request = self
            .http
            .get(self.graph(media_id))
            .query(&[("fields", "permalink"), ("access_token", token)]);
        match send_json(PLATFORM, request).await {
            Ok(body) => body.get("permalink").and_then(Value::as_str).map(str::to_string),
            Err(e) => {
                warn!("Could not read permalink of Instagram media {}: {}", media_id, e);
                None
            }
        }
    }
}

#[async_trait]
impl OAuthProvider for InstagramClient {
    fn platform(&self) -> Platform {
        PLATFORM
    }

    fn is_configured(&self) -> bool {
        !self.config.app_id.is_empty() && !self.config.app_secret.is_empty()
    }

    fn authorize_url(&self, state: &str, _code_verifier: Option<&str>) -> Result<Url, PlatformError> {
        AuthorizeRequest {
            endpoint: &self.config.authorize_url,
            client_id: &self.config.app_id,
            redirect_uri: &self.config.redirect_uri,
            scopes: &self.config.scopes,
            scope_separator: ",",
            state,
            code_verifier: None,
            extra: &[],
        }
        .build(PLATFORM)
    }

    async fn exchange_code(
        &self,
        code: &str,
        _code_verifier: Option<&str>,
    ) -> Result<Vec<ConnectedIdentity>, PlatformError> {
        let url = format!("{}/oauth/access_token", self.config.api_url.trim_end_matches('/'));
        let request = self.http.post(url).form(&[
            ("client_id", self.config.app_id.as_str()),
            ("client_secret", self.config.app_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code", code),
        ]);
        let body = send_json(PLATFORM, request).await?;
        // Newer responses wrap the token in a one-element "data" array
        let body = match body.get("data").and_then(|d| d.get(0)) {
            Some(inner) => inner.clone(),
            None => body,
        };
        let short = TokenSet::from_response(PLATFORM, &body, Utc::now())?;

        let request = self.http.get(self.graph_root("access_token")).query(&[
            ("grant_type", "ig_exchange_token"),
            ("client_secret", self.config.app_secret.as_str()),
            ("access_token", short.access_token.as_str()),
        ]);
        let body = send_json(PLATFORM, request).await?;
        let long = TokenSet::from_response(PLATFORM, &body, Utc::now())?.with_default_scopes(&self.config.scopes);

        let request = self.http.get(self.graph("me")).query(&[
            ("fields", "user_id,username"),
            ("access_token", long.access_token.as_str()),
        ]);
        let profile = send_json(PLATFORM, request).await?;
        let user_id = id_field(PLATFORM, &profile, "user_id").or_else(|_| id_field(PLATFORM, &profile, "id"))?;
        let username = profile
            .get("username")
            .and_then(Value::as_str)
            .unwrap_or(user_id.as_str())
            .to_string();

        info!("Instagram authorization granted for @{}", username);
        Ok(vec![ConnectedIdentity {
            platform_account_id: user_id,
            display_name: username,
            tokens: long,
        }])
    }

    async fn refresh(&self, account: &ConnectedAccount) -> Result<TokenSet, PlatformError> {
        let request = self.http.get(self.graph_root("refresh_access_token")).query(&[
            ("grant_type", "ig_refresh_token"),
            ("access_token", account.access_token.as_str()),
        ]);
        let body = send_json(PLATFORM, request).await?;
        Ok(TokenSet::from_response(PLATFORM, &body, Utc::now())?.with_default_scopes(&account.scopes))
    }
}

#[async_trait]
impl Publisher for InstagramClient {
    async fn publish(
        &self,
        account: &ConnectedAccount,
        post: &Post,
        _media: Option<MediaPayload>,
    ) -> Result<PublishOutcome, PlatformError> {
        let token = account.access_token.as_str();
        let container_id = self.create_container(account, post).await?;
        debug!("Created Instagram container {} for post {}", container_id, post.id);

        if post.kind.is_video() {
            self.wait_for_container(&container_id, token).await?;
        }

        let path = format!("{}/media_publish", account.platform_account_id);
        let request = self
            .http
            .post(self.graph(&path))
            .form(&[("creation_id", container_id.as_str()), ("access_token", token)]);
        let body = send_json(PLATFORM, request).await?;
        let media_id = id_field(PLATFORM, &body, "id")?;
        info!("Published post {} to Instagram as {}", post.id, media_id);

        Ok(PublishOutcome {
            permalink: self.permalink(&media_id, token).await,
            platform_post_id: media_id,
            container_id: Some(container_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn client() -> InstagramClient {
        let mut config = AppConfig::development().platforms.instagram;
        config.app_id = "ig-app".to_string();
        config.app_secret = "ig-secret".to_string();
        InstagramClient::new(Client::new(), config)
    }

    #[test]
    fn container_status_codes() {
        assert_eq!(ContainerStatus::parse("FINISHED"), Some(ContainerStatus::Finished));
        assert_eq!(ContainerStatus::parse("IN_PROGRESS"), Some(ContainerStatus::InProgress));
        assert_eq!(ContainerStatus::parse("EXPIRED"), Some(ContainerStatus::Expired));
        assert_eq!(ContainerStatus::parse("finished"), None);
    }

    #[test]
    fn authorize_url_uses_instagram_login() {
        let url = client().authorize_url("s", None).unwrap();
        assert_eq!(url.host_str(), Some("www.instagram.com"));
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["scope"], "instagram_business_basic,instagram_business_content_publish");
        assert_eq!(pairs["response_type"], "code");
    }

    #[test]
    fn endpoints() {
        let c = client();
        assert_eq!(c.graph("123/media"), "https://graph.instagram.com/v19.0/123/media");
        assert_eq!(c.graph_root("refresh_access_token"), "https://graph.instagram.com/refresh_access_token");
    }
}
