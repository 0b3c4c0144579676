use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use super::http::{id_field, send_json};
use super::oauth::{AuthorizeRequest, TokenSet};
use super::{ConnectedIdentity, MediaPayload, OAuthProvider, PlatformError, PublishOutcome, Publisher};
use crate::auth::mask_token;
use crate::config::FacebookConfig;
use crate::database::models::{ConnectedAccount, Post};
use crate::types::{Platform, PostKind};

const PLATFORM: Platform = Platform::Facebook;

/// Graph API client acting for Facebook Pages.
///
/// The connected account holds the Page token; the long-lived user token it
/// was derived from is kept as the refresh credential.
pub struct FacebookClient {
    http: Client,
    config: FacebookConfig,
}

impl FacebookClient {
    pub fn new(http: Client, config: FacebookConfig) -> Self {
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

    /// Upgrade a user token to a long-lived one with `fb_exchange_token`
    async fn long_lived_user_token(&self, user_token: &str) -> Result<TokenSet, PlatformError> {
        let request = self.http.get(self.graph("oauth/access_token")).query(&[
            ("grant_type", "fb_exchange_token"),
            ("client_id", self.config.app_id.as_str()),
            ("client_secret", self.config.app_secret.as_str()),
            ("fb_exchange_token", user_token),
        ]);
        let body = send_json(PLATFORM, request).await?;
        TokenSet::from_response(PLATFORM, &body, Utc::now())
    }

    async fn page_token(&self, page_id: &str, user_token: &str) -> Result<String, PlatformError> {
        let request = self
            .http
            .get(self.graph(page_id))
            .query(&[("fields", "access_token"), ("access_token", user_token)]);
        let body = send_json(PLATFORM, request).await?;
        body.get("access_token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PlatformError::Unauthorized {
                platform: PLATFORM,
                message: format!("no page token returned for page {}", page_id),
            })
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<Value, PlatformError> {
        let request = self.http.post(self.graph(path)).form(form);
        send_json(PLATFORM, request).await
    }
}

#[async_trait]
impl OAuthProvider for FacebookClient {
    fn platform(&self) -> Platform {
        PLATFORM
    }

    fn is_configured(&self) -> bool {
        !self.config.app_id.is_empty() && !self.config.app_secret.is_empty()
    }

    fn authorize_url(&self, state: &str, _code_verifier: Option<&str>) -> Result<Url, PlatformError> {
        let endpoint = format!(
            "{}/{}/dialog/oauth",
            self.config.dialog_url.trim_end_matches('/'),
            self.config.graph_version
        );
        AuthorizeRequest {
            endpoint: &endpoint,
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
        let request = self.http.get(self.graph("oauth/access_token")).query(&[
            ("client_id", self.config.app_id.as_str()),
            ("client_secret", self.config.app_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code", code),
        ]);
        let body = send_json(PLATFORM, request).await?;
        let short = TokenSet::from_response(PLATFORM, &body, Utc::now())?;
        let user = self.long_lived_user_token(&short.access_token).await?;
        debug!("Facebook user token upgraded: {}", mask_token(&user.access_token));

        let request = self.http.get(self.graph("me/accounts")).query(&[
            ("fields", "id,name,access_token"),
            ("access_token", user.access_token.as_str()),
        ]);
        let body = send_json(PLATFORM, request).await?;
        let pages = body.get("data").and_then(Value::as_array).cloned().unwrap_or_default();

        let mut identities = Vec::with_capacity(pages.len());
        for page in &pages {
            let page_id = id_field(PLATFORM, page, "id")?;
            let Some(page_token) = page.get("access_token").and_then(Value::as_str) else {
                debug!("Skipping page {} without a page token", page_id);
                continue;
            };
            identities.push(ConnectedIdentity {
                display_name: page
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or(page_id.as_str())
                    .to_string(),
                platform_account_id: page_id,
                tokens: TokenSet {
                    access_token: page_token.to_string(),
                    refresh_token: Some(user.access_token.clone()),
                    expires_at: user.expires_at,
                    scopes: user.scopes.clone(),
                }
                .with_default_scopes(&self.config.scopes),
            });
        }

        if identities.is_empty() {
            return Err(PlatformError::Rejected {
                platform: PLATFORM,
                message: "no Facebook Pages were granted".to_string(),
            });
        }

        info!("Facebook authorization granted {} page(s)", identities.len());
        Ok(identities)
    }

    async fn refresh(&self, account: &ConnectedAccount) -> Result<TokenSet, PlatformError> {
        let user_token = account.refresh_token.as_deref().ok_or_else(|| PlatformError::Unauthorized {
            platform: PLATFORM,
            message: "no user token stored for this page".to_string(),
        })?;

        let user = self.long_lived_user_token(user_token).await?;
        let page_token = self.page_token(&account.platform_account_id, &user.access_token).await?;

        Ok(TokenSet {
            access_token: page_token,
            refresh_token: Some(user.access_token),
            expires_at: user.expires_at,
            scopes: account.scopes.clone(),
        })
    }
}

#[async_trait]
impl Publisher for FacebookClient {
    async fn publish(
        &self,
        account: &ConnectedAccount,
        post: &Post,
        _media: Option<MediaPayload>,
    ) -> Result<PublishOutcome, PlatformError> {
        let page = account.platform_account_id.as_str();
        let token = account.access_token.as_str();
        let message = post.caption().unwrap_or_default();
        let media_url = post.media_url.as_deref().unwrap_or_default();

        let body = match post.kind {
            PostKind::Text | PostKind::Link => {
                let mut form = vec![("message", message), ("access_token", token)];
                if let Some(link) = post.link.as_deref() {
                    form.push(("link", link));
                }
                self.post_form(&format!("{}/feed", page), &form).await?
            }
            PostKind::Photo => {
                let form = [("url", media_url), ("caption", message), ("access_token", token)];
                self.post_form(&format!("{}/photos", page), &form).await?
            }
            PostKind::Video | PostKind::Reel => {
                let title = post.title.as_deref().unwrap_or_default();
                let form = [
                    ("file_url", media_url),
                    ("description", message),
                    ("title", title),
                    ("access_token", token),
                ];
                self.post_form(&format!("{}/videos", page), &form).await?
            }
        };

        // Photo uploads answer with both the photo id and the feed story id
        let id = id_field(PLATFORM, &body, "post_id").or_else(|_| id_field(PLATFORM, &body, "id"))?;
        info!("Published post {} to Facebook page {} as {}", post.id, page, id);

        Ok(PublishOutcome {
            permalink: Some(format!("https://www.facebook.com/{}", id)),
            platform_post_id: id,
            container_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn client() -> FacebookClient {
        let mut config = AppConfig::development().platforms.facebook;
        config.app_id = "123".to_string();
        config.app_secret = "shh".to_string();
        FacebookClient::new(Client::new(), config)
    }

    #[test]
    fn authorize_url_uses_versioned_dialog() {
        let url = client().authorize_url("state-1", None).unwrap();
        assert_eq!(url.host_str(), Some("www.facebook.com"));
        assert_eq!(url.path(), "/v19.0/dialog/oauth");

        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "123");
        assert_eq!(pairs["state"], "state-1");
        assert_eq!(pairs["scope"], "pages_show_list,pages_read_engagement,pages_manage_posts");
        assert!(!pairs.contains_key("code_challenge"));
    }

    #[test]
    fn graph_paths_are_versioned() {
        assert_eq!(client().graph("/me/accounts"), "https://graph.facebook.com/v19.0/me/accounts");
    }

    #[test]
    fn configured_requires_app_credentials() {
        assert!(client().is_configured());
        let bare = FacebookClient::new(Client::new(), AppConfig::development().platforms.facebook);
        assert!(!bare.is_configured());
    }
}
