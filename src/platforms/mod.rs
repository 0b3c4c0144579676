//! Clients for the social platforms the relay publishes to.
//!
//! Each platform implements [`OAuthProvider`] for the authorization code
//! flow and token refresh, and [`Publisher`] for relaying a post. Every
//! upstream failure is reduced to a [`PlatformError`] whose variant decides
//! whether the caller may retry.

pub mod facebook;
pub mod http;
pub mod instagram;
pub mod oauth;
pub mod youtube;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::PlatformsConfig;
use crate::database::models::{ConnectedAccount, Post};
use crate::types::Platform;

pub use facebook::FacebookClient;
pub use instagram::InstagramClient;
pub use oauth::TokenSet;
pub use youtube::YouTubeClient;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("{platform} rejected the credentials: {message}")]
    Unauthorized { platform: Platform, message: String },

    #[error("{platform} rate limit reached: {message}")]
    RateLimited { platform: Platform, message: String },

    #[error("{platform} rejected the request: {message}")]
    Rejected { platform: Platform, message: String },

    #[error("{platform} is unavailable: {message}")]
    Upstream { platform: Platform, message: String },

    #[error("{platform} request failed: {message}")]
    Transport { platform: Platform, message: String },

    #[error("{platform} returned an unexpected response: {message}")]
    InvalidResponse { platform: Platform, message: String },

    #[error("{0} is not configured")]
    NotConfigured(Platform),

    #[error("{platform} does not support {what}")]
    Unsupported { platform: Platform, what: String },

    #[error("HTTP client error: {0}")]
    Client(String),
}

impl PlatformError {
    /// Failures worth retrying later without user action
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlatformError::RateLimited { .. } | PlatformError::Upstream { .. } | PlatformError::Transport { .. }
        )
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, PlatformError::Unauthorized { .. })
    }
}

/// One platform identity produced by a completed authorization
#[derive(Debug, Clone)]
pub struct ConnectedIdentity {
    pub platform_account_id: String,
    pub display_name: String,
    pub tokens: TokenSet,
}

/// Identifiers of a published post
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishOutcome {
    pub platform_post_id: String,
    pub permalink: Option<String>,
    pub container_id: Option<String>,
}

/// Media bytes handed to publishers that upload instead of passing a URL
#[derive(Debug, Clone)]
pub struct MediaPayload {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn platform(&self) -> Platform;

    fn is_configured(&self) -> bool;

    fn uses_pkce(&self) -> bool {
        false
    }

    fn authorize_url(&self, state: &str, code_verifier: Option<&str>) -> Result<Url, PlatformError>;

    /// Exchange an authorization code for one or more connectable identities
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Vec<ConnectedIdentity>, PlatformError>;

    /// Obtain fresh tokens for a stored account
    async fn refresh(&self, account: &ConnectedAccount) -> Result<TokenSet, PlatformError>;
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Whether `publish` needs the media bytes rather than the public URL
    fn needs_media_bytes(&self, _post: &Post) -> bool {
        false
    }

    async fn publish(
        &self,
        account: &ConnectedAccount,
        post: &Post,
        media: Option<MediaPayload>,
    ) -> Result<PublishOutcome, PlatformError>;
}

/// The configured client of every platform
pub struct PlatformClients {
    facebook: Arc<FacebookClient>,
    instagram: Arc<InstagramClient>,
    youtube: Arc<YouTubeClient>,
}

impl PlatformClients {
    pub fn new(config: &PlatformsConfig) -> Result<Self, PlatformError> {
        let client = http::build_client(Duration::from_secs(config.request_timeout_secs))?;

        Ok(Self {
            facebook: Arc::new(FacebookClient::new(client.clone(), config.facebook.clone())),
            instagram: Arc::new(InstagramClient::new(client.clone(), config.instagram.clone())),
            youtube: Arc::new(YouTubeClient::new(client, config.youtube.clone())),
        })
    }

    pub fn provider(&self, platform: Platform) -> &dyn OAuthProvider {
        match platform {
            Platform::Facebook => self.facebook.as_ref(),
            Platform::Instagram => self.instagram.as_ref(),
            Platform::YouTube => self.youtube.as_ref(),
        }
    }

    pub fn publisher(&self, platform: Platform) -> &dyn Publisher {
        match platform {
            Platform::Facebook => self.facebook.as_ref(),
            Platform::Instagram => self.instagram.as_ref(),
            Platform::YouTube => self.youtube.as_ref(),
        }
    }
}
