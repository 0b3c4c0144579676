use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};

use crate::auth::mask_token;
use crate::database::models::{ConnectedAccount, TokenUpdate};
use crate::services::error::ServiceError;
use crate::state::AppState;
use crate::types::Platform;

/// Refreshes within this window are not repeated
pub const RECENT_REFRESH_SECS: i64 = 30;

/// True when the token expires within `lead` of `now`; tokens without expiry never refresh
pub fn should_refresh_now(expires_at: Option<DateTime<Utc>>, lead: Duration, now: DateTime<Utc>) -> bool {
    match expires_at {
        Some(at) => at - lead <= now,
        None => false,
    }
}

pub fn refreshed_recently(account: &ConnectedAccount, now: DateTime<Utc>) -> bool {
    account
        .last_refreshed_at
        .is_some_and(|at| now - at < Duration::seconds(RECENT_REFRESH_SECS))
}

/// Whether the account holds what its platform needs to refresh
fn has_refresh_credential(account: &ConnectedAccount) -> bool {
    match account.platform {
        // long-lived Instagram tokens refresh themselves
        Platform::Instagram => !account.access_token.is_empty(),
        Platform::Facebook | Platform::YouTube => account.refresh_token.is_some(),
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub reauth_required: usize,
    pub failed: usize,
}

/// Token lifecycle of connected accounts
pub struct TokenService {
    state: AppState,
}

impl TokenService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    fn lead(&self) -> Duration {
        Duration::seconds(self.state.config.scheduler.refresh_lead_secs)
    }

    /// Refresh the account only when its token is about to expire
    pub async fn ensure_fresh(&self, account: ConnectedAccount) -> Result<ConnectedAccount, ServiceError> {
        let now = Utc::now();
        if !should_refresh_now(account.expires_at, self.lead(), now) || refreshed_recently(&account, now) {
            return Ok(account);
        }
        debug!("Token of account {} expires soon, refreshing", account.id);
        self.refresh_account(account).await
    }

    /// Obtain new tokens from the platform and persist them
    pub async fn refresh_account(&self, mut account: ConnectedAccount) -> Result<ConnectedAccount, ServiceError> {
        if !has_refresh_credential(&account) {
            self.state.store.set_account_reauth(account.id, true).await?;
            return Err(ServiceError::ReauthRequired(format!(
                "{} account '{}' must be reconnected",
                account.platform, account.display_name
            )));
        }

        let provider = self.state.platforms.provider(account.platform);
        let tokens = match provider.refresh(&account).await {
            Ok(tokens) => tokens,
            Err(e) if e.is_unauthorized() => {
                warn!("Refresh rejected for account {}: {}", account.id, e);
                self.state.store.set_account_reauth(account.id, true).await?;
                return Err(ServiceError::ReauthRequired(format!(
                    "{} account '{}' must be reconnected",
                    account.platform, account.display_name
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let update = TokenUpdate {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token.or_else(|| account.refresh_token.clone()),
            expires_at: tokens.expires_at,
            refreshed_at: Utc::now(),
        };
        self.state.store.update_account_tokens(account.id, &update).await?;
        account.apply_tokens(&update);

        info!(
            "Refreshed {} token for account {} ({})",
            account.platform,
            account.id,
            mask_token(&account.access_token)
        );
        Ok(account)
    }

    /// `refresh_account` with linear backoff on transient failures
    pub async fn refresh_with_retry(&self, account: ConnectedAccount) -> Result<ConnectedAccount, ServiceError> {
        let scheduler = &self.state.config.scheduler;
        let attempts = scheduler.refresh_retry_attempts.max(1);

        let mut attempt = 1;
        loop {
            match self.refresh_account(account.clone()).await {
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = StdDuration::from_millis(scheduler.refresh_retry_delay_ms * attempt as u64);
                    warn!(
                        "Refresh of account {} failed (attempt {}/{}), retrying in {:?}: {}",
                        account.id, attempt, attempts, delay, e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Refresh every account whose token expires within the lead window
    pub async fn refresh_due_accounts(&self, now: DateTime<Utc>) -> Result<RefreshReport, ServiceError> {
        let batch = self.state.config.scheduler.refresh_batch_size;
        let due = self
            .state
            .store
            .accounts_expiring_before(now + self.lead(), batch)
            .await?;

        let mut report = RefreshReport::default();
        for account in due {
            if refreshed_recently(&account, now) {
                continue;
            }
            let id = account.id;
            match self.refresh_with_retry(account).await {
                Ok(_) => report.refreshed += 1,
                Err(ServiceError::ReauthRequired(_)) => report.reauth_required += 1,
                Err(e) => {
                    warn!("Could not refresh account {}: {}", id, e);
                    report.failed += 1;
                }
            }
        }

        if report.refreshed + report.reauth_required + report.failed > 0 {
            info!(
                "Token refresh: {} refreshed, {} need reauthorization, {} failed",
                report.refreshed, report.reauth_required, report.failed
            );
        }
        Ok(report)
    }
}
