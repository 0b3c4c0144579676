use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Platform;

/// A platform identity a user has authorized the relay to act for.
///
/// For Facebook this is a Page: `access_token` holds the Page token and
/// `refresh_token` the long-lived user token it was derived from. Instagram
/// tokens are refreshed with themselves, so `refresh_token` stays empty there.
#[derive(Debug, Clone)]
pub struct ConnectedAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub platform: Platform,
    pub platform_account_id: String,
    pub display_name: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
    pub needs_reauth: bool,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Token columns written after a refresh
#[derive(Debug, Clone)]
pub struct TokenUpdate {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub refreshed_at: DateTime<Utc>,
}

impl ConnectedAccount {
    pub fn apply_tokens(&mut self, update: &TokenUpdate) {
        self.access_token = update.access_token.clone();
        self.refresh_token = update.refresh_token.clone();
        self.expires_at = update.expires_at;
        self.last_refreshed_at = Some(update.refreshed_at);
        self.needs_reauth = false;
        self.updated_at = update.refreshed_at;
    }
}

/// API projection; tokens never leave the server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountView {
    pub id: Uuid,
    pub platform: Platform,
    pub platform_account_id: String,
    pub display_name: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
    pub needs_reauth: bool,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&ConnectedAccount> for AccountView {
    fn from(account: &ConnectedAccount) -> Self {
        Self {
            id: account.id,
            platform: account.platform,
            platform_account_id: account.platform_account_id.clone(),
            display_name: account.display_name.clone(),
            expires_at: account.expires_at,
            scopes: account.scopes.clone(),
            needs_reauth: account.needs_reauth,
            last_refreshed_at: account.last_refreshed_at,
            created_at: account.created_at,
        }
    }
}
