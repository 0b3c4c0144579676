use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::database::models::{AccountView, ConnectedAccount, OAuthState};
use crate::platforms::oauth::{generate_code_verifier, generate_state};
use crate::platforms::PlatformError;
use crate::services::error::ServiceError;
use crate::state::AppState;
use crate::types::Platform;

#[derive(Debug, Serialize)]
pub struct ConnectStart {
    pub authorize_url: String,
    pub state: String,
    pub expires_at: DateTime<Utc>,
}

/// Query parameters the provider sends to the callback
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConnectResult {
    pub platform: Platform,
    pub accounts: Vec<AccountView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_after: Option<String>,
}

/// Authorization code flow against the platforms
pub struct ConnectService {
    state: AppState,
}

impl ConnectService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn begin_connect(
        &self,
        user_id: Uuid,
        platform: Platform,
        redirect_after: Option<String>,
    ) -> Result<ConnectStart, ServiceError> {
        let provider = self.state.platforms.provider(platform);
        if !provider.is_configured() {
            return Err(PlatformError::NotConfigured(platform).into());
        }

        let redirect_after = redirect_after.filter(|r| !r.trim().is_empty());
        if let Some(target) = &redirect_after {
            self.check_redirect_target(target)?;
        }

        let state_value = generate_state();
        let code_verifier = provider.uses_pkce().then(generate_code_verifier);
        let authorize_url = provider.authorize_url(&state_value, code_verifier.as_deref())?;

        let now = Utc::now();
        let pending = OAuthState {
            state: state_value.clone(),
            user_id,
            platform,
            code_verifier,
            redirect_after,
            created_at: now,
            expires_at: now + Duration::seconds(self.state.config.security.oauth_state_ttl_secs),
        };
        self.state.store.insert_oauth_state(&pending).await?;

        info!("User {} started connecting {}", user_id, platform);
        Ok(ConnectStart {
            authorize_url: authorize_url.to_string(),
            state: state_value,
            expires_at: pending.expires_at,
        })
    }

    /// Only origins the frontend is served from may receive the redirect
    fn check_redirect_target(&self, target: &str) -> Result<(), ServiceError> {
        let url = Url::parse(target).map_err(|_| ServiceError::validation("redirect_after must be an absolute URL"))?;
        let origin = url.origin().ascii_serialization();
        let allowed = self
            .state
            .config
            .security
            .cors_origins
            .iter()
            .any(|o| o == "*" || o.trim_end_matches('/') == origin);
        if !allowed {
            return Err(ServiceError::validation(format!("redirect_after origin {} is not allowed", origin)));
        }
        Ok(())
    }

    /// Consume the state, exchange the code and store the connected accounts
    pub async fn complete_connect(
        &self,
        platform: Platform,
        params: CallbackParams,
    ) -> Result<ConnectResult, ServiceError> {
        let state_value = params
            .state
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ServiceError::OAuthState("missing state parameter".into()))?;

        // Deleted before anything else so a state can never be replayed
        let pending = self
            .state
            .store
            .take_oauth_state(&state_value)
            .await?
            .ok_or_else(|| ServiceError::OAuthState("unknown or already used state".into()))?;

        let now = Utc::now();
        if pending.is_expired(now) {
            return Err(ServiceError::OAuthState("authorization request expired".into()));
        }
        if pending.platform != platform {
            return Err(ServiceError::OAuthState(format!("state was issued for {}", pending.platform)));
        }

        if let Some(error) = params.error {
            warn!("{} authorization denied for user {}: {}", platform, pending.user_id, error);
            return Err(ServiceError::ProviderDenied(params.error_description.unwrap_or(error)));
        }

        let code = params
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ServiceError::validation("missing code parameter"))?;

        let provider = self.state.platforms.provider(platform);
        let identities = provider.exchange_code(&code, pending.code_verifier.as_deref()).await?;

        let mut accounts = Vec::with_capacity(identities.len());
        for identity in identities {
            let now = Utc::now();
            let account = ConnectedAccount {
                id: Uuid::new_v4(),
                user_id: pending.user_id,
                platform,
                platform_account_id: identity.platform_account_id,
                display_name: identity.display_name,
                access_token: identity.tokens.access_token,
                refresh_token: identity.tokens.refresh_token,
                expires_at: identity.tokens.expires_at,
                scopes: identity.tokens.scopes,
                needs_reauth: false,
                last_refreshed_at: Some(now),
                created_at: now,
                updated_at: now,
            };
            let stored = self.state.store.upsert_account(&account).await?;
            accounts.push(AccountView::from(&stored));
        }

        info!(
            "User {} connected {} {} account(s)",
            pending.user_id,
            accounts.len(),
            platform
        );
        Ok(ConnectResult {
            platform,
            accounts,
            redirect_after: pending.redirect_after,
        })
    }
}
