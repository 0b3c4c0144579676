use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::database::models::{ConnectedAccount, Post};
use crate::platforms::PublishOutcome;
use crate::services::error::ServiceError;
use crate::services::media_service::MediaService;
use crate::services::post_service::{validate_content, PostService};
use crate::services::token_service::TokenService;
use crate::state::AppState;
use crate::types::PostStatus;

/// How failed publications of scheduled posts are retried
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff: Duration::seconds(config.retry_backoff_secs),
        }
    }

    /// When to try again, or `None` when the failure is final
    pub fn retry_at(&self, attempts: i32, transient: bool, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        (transient && attempts < self.max_attempts).then(|| now + self.backoff * attempts)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishResult {
    Published,
    Retrying,
    Failed,
}

/// Relays posts to their platform and records the outcome
pub struct PublishService {
    state: AppState,
}

impl PublishService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    async fn account_of(&self, post: &Post) -> Result<ConnectedAccount, ServiceError> {
        let account = self
            .state
            .store
            .find_account(post.account_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("account"))?;
        if account.needs_reauth {
            return Err(ServiceError::ReauthRequired(format!(
                "{} account '{}' must be reconnected",
                account.platform, account.display_name
            )));
        }
        Ok(account)
    }

    /// Publish immediately; the returned post carries the outcome, failed or not
    pub async fn publish_now(&self, user_id: Uuid, id: Uuid) -> Result<Post, ServiceError> {
        let posts = PostService::new(self.state.clone());
        let post = posts.owned(user_id, id).await?;
        validate_content(&post)?;
        self.account_of(&post).await?;

        let from = [PostStatus::Draft, PostStatus::Scheduled, PostStatus::Failed];
        let claimed = posts.transition(&post, &from, PostStatus::Publishing).await?;
        let (post, _) = self.publish_claimed(claimed, None).await?;
        Ok(post)
    }

    /// Publish a post already moved to `Publishing` and persist where it ends up
    pub async fn publish_claimed(
        &self,
        mut post: Post,
        retry: Option<RetryPolicy>,
    ) -> Result<(Post, PublishResult), ServiceError> {
        post.attempts += 1;
        let relayed = self.relay(&post).await;

        let now = Utc::now();
        let result = match relayed {
            Ok(outcome) => {
                post.status = PostStatus::Published;
                post.platform_post_id = Some(outcome.platform_post_id);
                post.permalink = outcome.permalink;
                post.container_id = outcome.container_id.or(post.container_id);
                post.published_at = Some(now);
                post.last_error = None;
                info!("Published post {} to {} (attempt {})", post.id, post.platform, post.attempts);
                PublishResult::Published
            }
            Err(e) => {
                post.last_error = Some(e.to_string());
                match retry.and_then(|r| r.retry_at(post.attempts, e.is_transient(), now)) {
                    Some(at) => {
                        warn!("Post {} failed (attempt {}), retrying at {}: {}", post.id, post.attempts, at, e);
                        post.status = PostStatus::Scheduled;
                        post.scheduled_at = Some(at);
                        PublishResult::Retrying
                    }
                    None => {
                        error!("Post {} failed on attempt {}: {}", post.id, post.attempts, e);
                        post.status = PostStatus::Failed;
                        PublishResult::Failed
                    }
                }
            }
        };

        post.updated_at = now;
        if !self.state.store.record_post_outcome(&post).await? {
            error!("Post {} left publishing before its {:?} outcome was recorded", post.id, result);
            return Err(ServiceError::Conflict(format!(
                "post {} is no longer being published",
                post.id
            )));
        }
        Ok((post, result))
    }

    async fn relay(&self, post: &Post) -> Result<PublishOutcome, ServiceError> {
        let tokens = TokenService::new(self.state.clone());
        let account = tokens.ensure_fresh(self.account_of(post).await?).await?;

        let publisher = self.state.platforms.publisher(post.platform);
        let media = if publisher.needs_media_bytes(post) {
            let url = post
                .media_url
                .as_deref()
                .ok_or_else(|| ServiceError::validation("post has no media"))?;
            Some(MediaService::new(self.state.clone()).read_url(url).await?)
        } else {
            None
        };

        match publisher.publish(&account, post, media.clone()).await {
            Err(e) if e.is_unauthorized() => {
                warn!("{} rejected the token of account {}, refreshing once", post.platform, account.id);
                let account = tokens.refresh_account(account).await?;
                match publisher.publish(&account, post, media).await {
                    Err(e) if e.is_unauthorized() => {
                        self.state.store.set_account_reauth(account.id, true).await?;
                        Err(ServiceError::ReauthRequired(e.to_string()))
                    }
                    other => Ok(other?),
                }
            }
            other => Ok(other?),
        }
    }
}
