use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::memory::MemoryStore;
use crate::database::models::{ConnectedAccount, MediaObject, OAuthState, Post, TokenUpdate, User};
use crate::database::store::Store;
use crate::types::PostStatus;

/// Memory store that can hold one `find_account` call open, so tests can
/// interleave other writes with a service call in flight
#[derive(Default)]
pub struct PausingStore {
    inner: MemoryStore,
    armed: AtomicBool,
    reached: Notify,
    release: Notify,
}

impl PausingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `find_account` blocks until `release`
    pub fn pause_next_find_account(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Resolves once a caller is held in `find_account`
    pub async fn paused(&self) {
        self.reached.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl Store for PausingStore {
    async fn health_check(&self) -> Result<(), DatabaseError> {
        self.inner.health_check().await
    }

    async fn insert_user(&self, user: &User) -> Result<(), DatabaseError> {
        self.inner.insert_user(user).await
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        self.inner.find_user(id).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        self.inner.find_user_by_email(email).await
    }

    async fn insert_oauth_state(&self, state: &OAuthState) -> Result<(), DatabaseError> {
        self.inner.insert_oauth_state(state).await
    }

    async fn take_oauth_state(&self, state: &str) -> Result<Option<OAuthState>, DatabaseError> {
        self.inner.take_oauth_state(state).await
    }

    async fn purge_oauth_states(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
        self.inner.purge_oauth_states(now).await
    }

    async fn upsert_account(&self, account: &ConnectedAccount) -> Result<ConnectedAccount, DatabaseError> {
        self.inner.upsert_account(account).await
    }

    async fn find_account(&self, id: Uuid) -> Result<Option<ConnectedAccount>, DatabaseError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.reached.notify_one();
            self.release.notified().await;
        }
        self.inner.find_account(id).await
    }

    async fn list_accounts(&self, user_id: Uuid) -> Result<Vec<ConnectedAccount>, DatabaseError> {
        self.inner.list_accounts(user_id).await
    }

    async fn delete_account(&self, id: Uuid) -> Result<bool, DatabaseError> {
        self.inner.delete_account(id).await
    }

    async fn update_account_tokens(&self, id: Uuid, update: &TokenUpdate) -> Result<(), DatabaseError> {
        self.inner.update_account_tokens(id, update).await
    }

    async fn set_account_reauth(&self, id: Uuid, needs_reauth: bool) -> Result<(), DatabaseError> {
        self.inner.set_account_reauth(id, needs_reauth).await
    }

    async fn accounts_expiring_before(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ConnectedAccount>, DatabaseError> {
        self.inner.accounts_expiring_before(before, limit).await
    }

    async fn insert_media(&self, media: &MediaObject) -> Result<(), DatabaseError> {
        self.inner.insert_media(media).await
    }

    async fn find_media(&self, id: Uuid) -> Result<Option<MediaObject>, DatabaseError> {
        self.inner.find_media(id).await
    }

    async fn list_media(&self, user_id: Uuid) -> Result<Vec<MediaObject>, DatabaseError> {
        self.inner.list_media(user_id).await
    }

    async fn delete_media(&self, id: Uuid) -> Result<bool, DatabaseError> {
        self.inner.delete_media(id).await
    }

    async fn insert_post(&self, post: &Post) -> Result<(), DatabaseError> {
        self.inner.insert_post(post).await
    }

    async fn update_post_content(&self, post: &Post, from: &[PostStatus]) -> Result<Option<Post>, DatabaseError> {
        self.inner.update_post_content(post, from).await
    }

    async fn record_post_outcome(&self, post: &Post) -> Result<bool, DatabaseError> {
        self.inner.record_post_outcome(post).await
    }

    async fn find_post(&self, id: Uuid) -> Result<Option<Post>, DatabaseError> {
        self.inner.find_post(id).await
    }

    async fn list_posts(&self, user_id: Uuid, status: Option<PostStatus>) -> Result<Vec<Post>, DatabaseError> {
        self.inner.list_posts(user_id, status).await
    }

    async fn delete_post(&self, id: Uuid) -> Result<bool, DatabaseError> {
        self.inner.delete_post(id).await
    }

    async fn transition_post(
        &self,
        id: Uuid,
        from: &[PostStatus],
        to: PostStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Post>, DatabaseError> {
        self.inner.transition_post(id, from, to, now).await
    }

    async fn reschedule_post(
        &self,
        id: Uuid,
        from: &[PostStatus],
        to: PostStatus,
        scheduled_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<Post>, DatabaseError> {
        self.inner.reschedule_post(id, from, to, scheduled_at, now).await
    }

    async fn claim_due_posts(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Post>, DatabaseError> {
        self.inner.claim_due_posts(now, limit).await
    }

    async fn fail_stale_publishing(
        &self,
        claimed_before: DateTime<Utc>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DatabaseError> {
        self.inner.fail_stale_publishing(claimed_before, reason, now).await
    }

    async fn cancel_scheduled_posts_for_account(
        &self,
        account_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DatabaseError> {
        self.inner.cancel_scheduled_posts_for_account(account_id, reason, now).await
    }
}
