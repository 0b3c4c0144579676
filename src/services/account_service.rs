use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::database::models::{AccountView, ConnectedAccount};
use crate::services::error::ServiceError;
use crate::services::token_service::TokenService;
use crate::state::AppState;

pub const DISCONNECTED_REASON: &str = "account disconnected";

pub struct AccountService {
    state: AppState,
}

impl AccountService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<AccountView>, ServiceError> {
        let accounts = self.state.store.list_accounts(user_id).await?;
        Ok(accounts.iter().map(AccountView::from).collect())
    }

    /// The account if the user owns it; other users' accounts read as missing
    pub async fn owned(&self, user_id: Uuid, id: Uuid) -> Result<ConnectedAccount, ServiceError> {
        self.state
            .store
            .find_account(id)
            .await?
            .filter(|a| a.user_id == user_id)
            .ok_or_else(|| ServiceError::not_found("account"))
    }

    pub async fn get(&self, user_id: Uuid, id: Uuid) -> Result<AccountView, ServiceError> {
        Ok(AccountView::from(&self.owned(user_id, id).await?))
    }

    /// Remove the account and cancel the posts still scheduled on it
    pub async fn disconnect(&self, user_id: Uuid, id: Uuid) -> Result<u64, ServiceError> {
        let account = self.owned(user_id, id).await?;
        let cancelled = self
            .state
            .store
            .cancel_scheduled_posts_for_account(account.id, DISCONNECTED_REASON, Utc::now())
            .await?;
        self.state.store.delete_account(account.id).await?;

        info!(
            "User {} disconnected {} account {} ({} scheduled post(s) cancelled)",
            user_id, account.platform, account.id, cancelled
        );
        Ok(cancelled)
    }

    /// Force a token refresh regardless of expiry
    pub async fn refresh(&self, user_id: Uuid, id: Uuid) -> Result<AccountView, ServiceError> {
        let account = self.owned(user_id, id).await?;
        let refreshed = TokenService::new(self.state.clone()).refresh_account(account).await?;
        Ok(AccountView::from(&refreshed))
    }
}
