use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::models::{ConnectedAccount, MediaObject, OAuthState, Post, TokenUpdate, User};
use crate::database::store::Store;
use crate::types::PostStatus;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    oauth_states: HashMap<String, OAuthState>,
    accounts: HashMap<Uuid, ConnectedAccount>,
    media: HashMap<Uuid, MediaObject>,
    posts: HashMap<Uuid, Post>,
}

/// In-process store used for development and tests.
///
/// A single lock guards every table so conditional writes are atomic
/// in the same way the Postgres statements are.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<(), DatabaseError> {
        Ok(())
    }

    async fn insert_user(&self, user: &User) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(DatabaseError::Conflict(format!("user '{}' already exists", user.email)));
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn insert_oauth_state(&self, state: &OAuthState) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write().await;
        if tables.oauth_states.contains_key(&state.state) {
            return Err(DatabaseError::Conflict("oauth state already exists".to_string()));
        }
        tables.oauth_states.insert(state.state.clone(), state.clone());
        Ok(())
    }

    async fn take_oauth_state(&self, state: &str) -> Result<Option<OAuthState>, DatabaseError> {
        Ok(self.tables.write().await.oauth_states.remove(state))
    }

    async fn purge_oauth_states(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let mut tables = self.tables.write().await;
        let before = tables.oauth_states.len();
        tables.oauth_states.retain(|_, s| !s.is_expired(now));
        Ok((before - tables.oauth_states.len()) as u64)
    }

    async fn upsert_account(&self, account: &ConnectedAccount) -> Result<ConnectedAccount, DatabaseError> {
        let mut tables = self.tables.write().await;
        let existing = tables.accounts.values_mut().find(|a| {
            a.user_id == account.user_id
                && a.platform == account.platform
                && a.platform_account_id == account.platform_account_id
        });

        if let Some(stored) = existing {
            stored.display_name = account.display_name.clone();
            stored.access_token = account.access_token.clone();
            if account.refresh_token.is_some() {
                stored.refresh_token = account.refresh_token.clone();
            }
            stored.expires_at = account.expires_at;
            stored.scopes = account.scopes.clone();
            stored.needs_reauth = false;
            stored.last_refreshed_at = account.last_refreshed_at;
            stored.updated_at = account.updated_at;
            return Ok(stored.clone());
        }

        tables.accounts.insert(account.id, account.clone());
        Ok(account.clone())
    }

    async fn find_account(&self, id: Uuid) -> Result<Option<ConnectedAccount>, DatabaseError> {
        Ok(self.tables.read().await.accounts.get(&id).cloned())
    }

    async fn list_accounts(&self, user_id: Uuid) -> Result<Vec<ConnectedAccount>, DatabaseError> {
        let tables = self.tables.read().await;
        let mut accounts: Vec<_> = tables
            .accounts
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| {
            (a.platform.as_str(), &a.display_name).cmp(&(b.platform.as_str(), &b.display_name))
        });
        Ok(accounts)
    }

    async fn delete_account(&self, id: Uuid) -> Result<bool, DatabaseError> {
        Ok(self.tables.write().await.accounts.remove(&id).is_some())
    }

    async fn update_account_tokens(&self, id: Uuid, update: &TokenUpdate) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write().await;
        let account = tables
            .accounts
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("account {}", id)))?;
        account.apply_tokens(update);
        Ok(())
    }

    async fn set_account_reauth(&self, id: Uuid, needs_reauth: bool) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write().await;
        if let Some(account) = tables.accounts.get_mut(&id) {
            account.needs_reauth = needs_reauth;
            account.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn accounts_expiring_before(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ConnectedAccount>, DatabaseError> {
        let tables = self.tables.read().await;
        let mut accounts: Vec<_> = tables
            .accounts
            .values()
            .filter(|a| !a.needs_reauth && a.expires_at.is_some_and(|at| at <= before))
            .cloned()
            .collect();
        accounts.sort_by_key(|a| a.expires_at);
        accounts.truncate(limit);
        Ok(accounts)
    }

    async fn insert_media(&self, media: &MediaObject) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write().await;
        if tables.media.values().any(|m| m.storage_key == media.storage_key) {
            return Err(DatabaseError::Conflict(format!("storage key '{}' in use", media.storage_key)));
        }
        tables.media.insert(media.id, media.clone());
        Ok(())
    }

    async fn find_media(&self, id: Uuid) -> Result<Option<MediaObject>, DatabaseError> {
        Ok(self.tables.read().await.media.get(&id).cloned())
    }

    async fn list_media(&self, user_id: Uuid) -> Result<Vec<MediaObject>, DatabaseError> {
        let tables = self.tables.read().await;
        let mut media: Vec<_> = tables.media.values().filter(|m| m.user_id == user_id).cloned().collect();
        media.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(media)
    }

    async fn delete_media(&self, id: Uuid) -> Result<bool, DatabaseError> {
        Ok(self.tables.write().await.media.remove(&id).is_some())
    }

    async fn insert_post(&self, post: &Post) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write().await;
        if tables.posts.contains_key(&post.id) {
            return Err(DatabaseError::Conflict(format!("post {} already exists", post.id)));
        }
        tables.posts.insert(post.id, post.clone());
        Ok(())
    }

    async fn update_post_content(&self, post: &Post, from: &[PostStatus]) -> Result<Option<Post>, DatabaseError> {
        let mut tables = self.tables.write().await;
        let Some(stored) = tables.posts.get_mut(&post.id).filter(|p| from.contains(&p.status)) else {
            return Ok(None);
        };
        stored.account_id = post.account_id;
        stored.platform = post.platform;
        stored.kind = post.kind;
        stored.title = post.title.clone();
        stored.body = post.body.clone();
        stored.link = post.link.clone();
        stored.media_url = post.media_url.clone();
        stored.media_content_type = post.media_content_type.clone();
        stored.privacy = post.privacy.clone();
        stored.updated_at = post.updated_at;
        Ok(Some(stored.clone()))
    }

    async fn record_post_outcome(&self, post: &Post) -> Result<bool, DatabaseError> {
        let mut tables = self.tables.write().await;
        match tables.posts.get_mut(&post.id) {
            Some(stored) if stored.status == PostStatus::Publishing => {
                stored.status = post.status;
                stored.scheduled_at = post.scheduled_at;
                stored.published_at = post.published_at;
                stored.platform_post_id = post.platform_post_id.clone();
                stored.permalink = post.permalink.clone();
                stored.container_id = post.container_id.clone();
                stored.attempts = post.attempts;
                stored.last_error = post.last_error.clone();
                stored.updated_at = post.updated_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_post(&self, id: Uuid) -> Result<Option<Post>, DatabaseError> {
        Ok(self.tables.read().await.posts.get(&id).cloned())
    }

    async fn list_posts(&self, user_id: Uuid, status: Option<PostStatus>) -> Result<Vec<Post>, DatabaseError> {
        let tables = self.tables.read().await;
        let mut posts: Vec<_> = tables
            .posts
            .values()
            .filter(|p| p.user_id == user_id && status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts)
    }

    async fn delete_post(&self, id: Uuid) -> Result<bool, DatabaseError> {
        Ok(self.tables.write().await.posts.remove(&id).is_some())
    }

    async fn transition_post(
        &self,
        id: Uuid,
        from: &[PostStatus],
        to: PostStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Post>, DatabaseError> {
        let mut tables = self.tables.write().await;
        let Some(post) = tables.posts.get_mut(&id) else {
            return Ok(None);
        };
        if !from.contains(&post.status) {
            return Ok(None);
        }
        post.status = to;
        post.updated_at = now;
        Ok(Some(post.clone()))
    }

    async fn reschedule_post(
        &self,
        id: Uuid,
        from: &[PostStatus],
        to: PostStatus,
        scheduled_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<Post>, DatabaseError> {
        let mut tables = self.tables.write().await;
        let Some(post) = tables.posts.get_mut(&id).filter(|p| from.contains(&p.status)) else {
            return Ok(None);
        };
        post.status = to;
        post.scheduled_at = scheduled_at;
        post.attempts = 0;
        post.last_error = None;
        post.updated_at = now;
        Ok(Some(post.clone()))
    }

    async fn claim_due_posts(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Post>, DatabaseError> {
        let mut tables = self.tables.write().await;
        let mut due: Vec<(DateTime<Utc>, Uuid)> = tables
            .posts
            .values()
            .filter(|p| p.status == PostStatus::Scheduled)
            .filter_map(|p| p.scheduled_at.filter(|at| *at <= now).map(|at| (at, p.id)))
            .collect();
        due.sort();
        due.truncate(limit);

        let mut claimed = Vec::with_capacity(due.len());
        for (_, id) in due {
            if let Some(post) = tables.posts.get_mut(&id) {
                post.status = PostStatus::Publishing;
                post.updated_at = now;
                claimed.push(post.clone());
            }
        }
        Ok(claimed)
    }

    async fn fail_stale_publishing(
        &self,
        claimed_before: DateTime<Utc>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DatabaseError> {
        let mut tables = self.tables.write().await;
        let mut changed = 0;
        for post in tables
            .posts
            .values_mut()
            .filter(|p| p.status == PostStatus::Publishing && p.updated_at < claimed_before)
        {
            post.status = PostStatus::Failed;
            post.last_error = Some(reason.to_string());
            post.updated_at = now;
            changed += 1;
        }
        Ok(changed)
    }

    async fn cancel_scheduled_posts_for_account(
        &self,
        account_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DatabaseError> {
        let mut tables = self.tables.write().await;
        let mut changed = 0;
        for post in tables
            .posts
            .values_mut()
            .filter(|p| p.account_id == account_id && p.status == PostStatus::Scheduled)
        {
            post.status = PostStatus::Cancelled;
            post.last_error = Some(reason.to_string());
            post.updated_at = now;
            changed += 1;
        }
        Ok(changed)
    }
}
