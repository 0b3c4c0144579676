use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::models::{ConnectedAccount, MediaObject, OAuthState, Post, TokenUpdate, User};
use crate::types::PostStatus;

/// Persistence seam between the services and the backing database.
///
/// Every method is a single logical statement. Post writes are conditional on the
/// current status and must be atomic in the implementation.
#[async_trait]
pub trait Store: Send + Sync {
    async fn health_check(&self) -> Result<(), DatabaseError>;

    // Users

    /// Fails with `Conflict` when the email is taken
    async fn insert_user(&self, user: &User) -> Result<(), DatabaseError>;
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError>;

    // OAuth states

    async fn insert_oauth_state(&self, state: &OAuthState) -> Result<(), DatabaseError>;
    /// Delete and return the state; a second call for the same value returns `None`
    async fn take_oauth_state(&self, state: &str) -> Result<Option<OAuthState>, DatabaseError>;
    async fn purge_oauth_states(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError>;

    // Connected accounts

    /// Insert or update by `(user_id, platform, platform_account_id)`; the stored row is returned
    async fn upsert_account(&self, account: &ConnectedAccount) -> Result<ConnectedAccount, DatabaseError>;
    async fn find_account(&self, id: Uuid) -> Result<Option<ConnectedAccount>, DatabaseError>;
    async fn list_accounts(&self, user_id: Uuid) -> Result<Vec<ConnectedAccount>, DatabaseError>;
    async fn delete_account(&self, id: Uuid) -> Result<bool, DatabaseError>;
    async fn update_account_tokens(&self, id: Uuid, update: &TokenUpdate) -> Result<(), DatabaseError>;
    async fn set_account_reauth(&self, id: Uuid, needs_reauth: bool) -> Result<(), DatabaseError>;
    /// Accounts whose tokens expire before `before` and that can still be refreshed
    async fn accounts_expiring_before(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ConnectedAccount>, DatabaseError>;

    // Media

    async fn insert_media(&self, media: &MediaObject) -> Result<(), DatabaseError>;
    async fn find_media(&self, id: Uuid) -> Result<Option<MediaObject>, DatabaseError>;
    async fn list_media(&self, user_id: Uuid) -> Result<Vec<MediaObject>, DatabaseError>;
    async fn delete_media(&self, id: Uuid) -> Result<bool, DatabaseError>;

    // Posts

    async fn insert_post(&self, post: &Post) -> Result<(), DatabaseError>;
    /// Write the user-editable columns (account, platform, kind, content, media, privacy)
    /// only while the status is one of `from`; publication columns are left alone
    async fn update_post_content(&self, post: &Post, from: &[PostStatus]) -> Result<Option<Post>, DatabaseError>;
    /// Store a publication outcome; only a post still in `Publishing` is written
    async fn record_post_outcome(&self, post: &Post) -> Result<bool, DatabaseError>;
    async fn find_post(&self, id: Uuid) -> Result<Option<Post>, DatabaseError>;
    async fn list_posts(&self, user_id: Uuid, status: Option<PostStatus>) -> Result<Vec<Post>, DatabaseError>;
    async fn delete_post(&self, id: Uuid) -> Result<bool, DatabaseError>;
    /// Move the post to `to` only if its current status is one of `from`
    async fn transition_post(
        &self,
        id: Uuid,
        from: &[PostStatus],
        to: PostStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Post>, DatabaseError>;
    /// Move the post to `to` with a new `scheduled_at` if its status is one of `from`;
    /// attempts and the last error start over
    async fn reschedule_post(
        &self,
        id: Uuid,
        from: &[PostStatus],
        to: PostStatus,
        scheduled_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<Post>, DatabaseError>;
    /// Move up to `limit` due scheduled posts to `Publishing` and return them
    async fn claim_due_posts(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Post>, DatabaseError>;
    /// Fail posts left in `Publishing` since before `claimed_before`, recording `reason`
    async fn fail_stale_publishing(
        &self,
        claimed_before: DateTime<Utc>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DatabaseError>;
    /// Cancel every scheduled post of an account, recording `reason`; returns how many changed
    async fn cancel_scheduled_posts_for_account(
        &self,
        account_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DatabaseError>;
}
