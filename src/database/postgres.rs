use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::models::{ConnectedAccount, MediaObject, OAuthState, Post, TokenUpdate, User};
use crate::database::store::Store;
use crate::types::{ParseEnumError, PostStatus};

const ACCOUNT_COLUMNS: &str = "id, user_id, platform, platform_account_id, display_name, access_token, \
     refresh_token, expires_at, scopes, needs_reauth, last_refreshed_at, created_at, updated_at";

const POST_COLUMNS: &str = "id, user_id, account_id, platform, kind, title, body, link, media_url, \
     media_content_type, privacy, status, scheduled_at, published_at, platform_post_id, permalink, \
     container_id, attempts, last_error, created_at, updated_at";

const MEDIA_COLUMNS: &str =
    "id, user_id, file_name, content_type, size_bytes, storage_key, public_url, created_at";

/// Postgres-backed store
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse_column<T>(value: &str) -> Result<T, DatabaseError>
where
    T: FromStr<Err = ParseEnumError>,
{
    value
        .parse()
        .map_err(|e: ParseEnumError| DatabaseError::CorruptRow(e.to_string()))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

fn status_names(statuses: &[PostStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

fn oauth_state_from_row(row: &PgRow) -> Result<OAuthState, DatabaseError> {
    let platform: String = row.try_get("platform")?;
    Ok(OAuthState {
        state: row.try_get("state")?,
        user_id: row.try_get("user_id")?,
        platform: parse_column(&platform)?,
        code_verifier: row.try_get("code_verifier")?,
        redirect_after: row.try_get("redirect_after")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

fn account_from_row(row: &PgRow) -> Result<ConnectedAccount, DatabaseError> {
    let platform: String = row.try_get("platform")?;
    Ok(ConnectedAccount {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        platform: parse_column(&platform)?,
        platform_account_id: row.try_get("platform_account_id")?,
        display_name: row.try_get("display_name")?,
        access_token: row.try_get("access_token")?,
        refresh_token: row.try_get("refresh_token")?,
        expires_at: row.try_get("expires_at")?,
        scopes: row.try_get("scopes")?,
        needs_reauth: row.try_get("needs_reauth")?,
        last_refreshed_at: row.try_get("last_refreshed_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn post_from_row(row: &PgRow) -> Result<Post, DatabaseError> {
    let platform: String = row.try_get("platform")?;
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    Ok(Post {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        account_id: row.try_get("account_id")?,
        platform: parse_column(&platform)?,
        kind: parse_column(&kind)?,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        link: row.try_get("link")?,
        media_url: row.try_get("media_url")?,
        media_content_type: row.try_get("media_content_type")?,
        privacy: row.try_get("privacy")?,
        status: parse_column(&status)?,
        scheduled_at: row.try_get("scheduled_at")?,
        published_at: row.try_get("published_at")?,
        platform_post_id: row.try_get("platform_post_id")?,
        permalink: row.try_get("permalink")?,
        container_id: row.try_get("container_id")?,
        attempts: row.try_get("attempts")?,
        last_error: row.try_get("last_error")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn posts_from_rows(rows: Vec<PgRow>) -> Result<Vec<Post>, DatabaseError> {
    rows.iter().map(post_from_row).collect()
}

#[async_trait]
impl Store for PgStore {
    async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_user(&self, user: &User) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO users (id, email, password_hash, display_name, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(DatabaseError::Conflict(format!("user '{}' already exists", user.email)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, display_name, created_at, updated_at
             FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, display_name, created_at, updated_at
             FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn insert_oauth_state(&self, state: &OAuthState) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO oauth_states (state, user_id, platform, code_verifier, redirect_after, created_at, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&state.state)
        .bind(state.user_id)
        .bind(state.platform.as_str())
        .bind(&state.code_verifier)
        .bind(&state.redirect_after)
        .bind(state.created_at)
        .bind(state.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn take_oauth_state(&self, state: &str) -> Result<Option<OAuthState>, DatabaseError> {
        let row = sqlx::query(
            "DELETE FROM oauth_states WHERE state = $1
             RETURNING state, user_id, platform, code_verifier, redirect_after, created_at, expires_at",
        )
        .bind(state)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(oauth_state_from_row).transpose()
    }

    async fn purge_oauth_states(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM oauth_states WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn upsert_account(&self, account: &ConnectedAccount) -> Result<ConnectedAccount, DatabaseError> {
        let query = format!(
            "INSERT INTO connected_accounts ({ACCOUNT_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             ON CONFLICT (user_id, platform, platform_account_id) DO UPDATE SET
                 display_name = EXCLUDED.display_name,
                 access_token = EXCLUDED.access_token,
                 refresh_token = COALESCE(EXCLUDED.refresh_token, connected_accounts.refresh_token),
                 expires_at = EXCLUDED.expires_at,
                 scopes = EXCLUDED.scopes,
                 needs_reauth = false,
                 last_refreshed_at = EXCLUDED.last_refreshed_at,
                 updated_at = EXCLUDED.updated_at
             RETURNING {ACCOUNT_COLUMNS}"
        );

        let row = sqlx::query(&query)
            .bind(account.id)
            .bind(account.user_id)
            .bind(account.platform.as_str())
            .bind(&account.platform_account_id)
            .bind(&account.display_name)
            .bind(&account.access_token)
            .bind(&account.refresh_token)
            .bind(account.expires_at)
            .bind(&account.scopes)
            .bind(account.needs_reauth)
            .bind(account.last_refreshed_at)
            .bind(account.created_at)
            .bind(account.updated_at)
            .fetch_one(&self.pool)
            .await?;

        account_from_row(&row)
    }

    async fn find_account(&self, id: Uuid) -> Result<Option<ConnectedAccount>, DatabaseError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM connected_accounts WHERE id = $1");
        let row = sqlx::query(&query).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn list_accounts(&self, user_id: Uuid) -> Result<Vec<ConnectedAccount>, DatabaseError> {
        let query = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM connected_accounts WHERE user_id = $1
             ORDER BY platform, display_name"
        );
        let rows = sqlx::query(&query).bind(user_id).fetch_all(&self.pool).await?;
        rows.iter().map(account_from_row).collect()
    }

    async fn delete_account(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM connected_accounts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_account_tokens(&self, id: Uuid, update: &TokenUpdate) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE connected_accounts
             SET access_token = $2, refresh_token = $3, expires_at = $4,
                 last_refreshed_at = $5, updated_at = $5, needs_reauth = false
             WHERE id = $1",
        )
        .bind(id)
        .bind(&update.access_token)
        .bind(&update.refresh_token)
        .bind(update.expires_at)
        .bind(update.refreshed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("account {}", id)));
        }
        Ok(())
    }

    async fn set_account_reauth(&self, id: Uuid, needs_reauth: bool) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE connected_accounts SET needs_reauth = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(needs_reauth)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn accounts_expiring_before(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ConnectedAccount>, DatabaseError> {
        let query = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM connected_accounts
             WHERE expires_at IS NOT NULL AND expires_at <= $1 AND needs_reauth = false
             ORDER BY expires_at
             LIMIT $2"
        );
        let rows = sqlx::query(&query)
            .bind(before)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(account_from_row).collect()
    }

    async fn insert_media(&self, media: &MediaObject) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO media_objects (id, user_id, file_name, content_type, size_bytes, storage_key, public_url, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(media.id)
        .bind(media.user_id)
        .bind(&media.file_name)
        .bind(&media.content_type)
        .bind(media.size_bytes)
        .bind(&media.storage_key)
        .bind(&media.public_url)
        .bind(media.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_media(&self, id: Uuid) -> Result<Option<MediaObject>, DatabaseError> {
        let query = format!("SELECT {MEDIA_COLUMNS} FROM media_objects WHERE id = $1");
        let media = sqlx::query_as::<_, MediaObject>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(media)
    }

    async fn list_media(&self, user_id: Uuid) -> Result<Vec<MediaObject>, DatabaseError> {
        let query = format!(
            "SELECT {MEDIA_COLUMNS} FROM media_objects WHERE user_id = $1 ORDER BY created_at DESC"
        );
        let media = sqlx::query_as::<_, MediaObject>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(media)
    }

    async fn delete_media(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM media_objects WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_post(&self, post: &Post) -> Result<(), DatabaseError> {
        let query = format!(
            "INSERT INTO posts ({POST_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)"
        );
        sqlx::query(&query)
            .bind(post.id)
            .bind(post.user_id)
            .bind(post.account_id)
            .bind(post.platform.as_str())
            .bind(post.kind.as_str())
            .bind(&post.title)
            .bind(&post.body)
            .bind(&post.link)
            .bind(&post.media_url)
            .bind(&post.media_content_type)
            .bind(&post.privacy)
            .bind(post.status.as_str())
            .bind(post.scheduled_at)
            .bind(post.published_at)
            .bind(&post.platform_post_id)
            .bind(&post.permalink)
            .bind(&post.container_id)
            .bind(post.attempts)
            .bind(&post.last_error)
            .bind(post.created_at)
            .bind(post.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_post_content(&self, post: &Post, from: &[PostStatus]) -> Result<Option<Post>, DatabaseError> {
        let query = format!(
            "UPDATE posts SET
                 account_id = $2, platform = $3, kind = $4, title = $5, body = $6, link = $7,
                 media_url = $8, media_content_type = $9, privacy = $10, updated_at = $11
             WHERE id = $1 AND status = ANY($12)
             RETURNING {POST_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(post.id)
            .bind(post.account_id)
            .bind(post.platform.as_str())
            .bind(post.kind.as_str())
            .bind(&post.title)
            .bind(&post.body)
            .bind(&post.link)
            .bind(&post.media_url)
            .bind(&post.media_content_type)
            .bind(&post.privacy)
            .bind(post.updated_at)
            .bind(status_names(from))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(post_from_row).transpose()
    }

    async fn record_post_outcome(&self, post: &Post) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE posts SET
                 status = $2, scheduled_at = $3, published_at = $4, platform_post_id = $5,
                 permalink = $6, container_id = $7, attempts = $8, last_error = $9, updated_at = $10
             WHERE id = $1 AND status = 'publishing'",
        )
        .bind(post.id)
        .bind(post.status.as_str())
        .bind(post.scheduled_at)
        .bind(post.published_at)
        .bind(&post.platform_post_id)
        .bind(&post.permalink)
        .bind(&post.container_id)
        .bind(post.attempts)
        .bind(&post.last_error)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_post(&self, id: Uuid) -> Result<Option<Post>, DatabaseError> {
        let query = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
        let row = sqlx::query(&query).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(post_from_row).transpose()
    }

    async fn list_posts(&self, user_id: Uuid, status: Option<PostStatus>) -> Result<Vec<Post>, DatabaseError> {
        let query = format!(
            "SELECT {POST_COLUMNS} FROM posts
             WHERE user_id = $1 AND ($2::TEXT IS NULL OR status = $2)
             ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?;
        posts_from_rows(rows)
    }

    async fn delete_post(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn transition_post(
        &self,
        id: Uuid,
        from: &[PostStatus],
        to: PostStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Post>, DatabaseError> {
        let query = format!(
            "UPDATE posts SET status = $2, updated_at = $3
             WHERE id = $1 AND status = ANY($4)
             RETURNING {POST_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(to.as_str())
            .bind(now)
            .bind(status_names(from))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(post_from_row).transpose()
    }

    async fn reschedule_post(
        &self,
        id: Uuid,
        from: &[PostStatus],
        to: PostStatus,
        scheduled_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<Post>, DatabaseError> {
        let query = format!(
            "UPDATE posts SET status = $2, scheduled_at = $3, attempts = 0, last_error = NULL, updated_at = $4
             WHERE id = $1 AND status = ANY($5)
             RETURNING {POST_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(to.as_str())
            .bind(scheduled_at)
            .bind(now)
            .bind(status_names(from))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(post_from_row).transpose()
    }

    async fn claim_due_posts(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Post>, DatabaseError> {
        // SKIP LOCKED keeps concurrent schedulers from claiming the same rows
        let query = format!(
            "UPDATE posts SET status = 'publishing', updated_at = $1
             WHERE id IN (
                 SELECT id FROM posts
                 WHERE status = 'scheduled' AND scheduled_at <= $1
                 ORDER BY scheduled_at
                 LIMIT $2
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {POST_COLUMNS}"
        );
        let rows = sqlx::query(&query)
            .bind(now)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        posts_from_rows(rows)
    }

    async fn fail_stale_publishing(
        &self,
        claimed_before: DateTime<Utc>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE posts SET status = 'failed', last_error = $2, updated_at = $3
             WHERE status = 'publishing' AND updated_at < $1",
        )
        .bind(claimed_before)
        .bind(reason)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn cancel_scheduled_posts_for_account(
        &self,
        account_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE posts SET status = 'cancelled', last_error = $2, updated_at = $3
             WHERE account_id = $1 AND status = 'scheduled'",
        )
        .bind(account_id)
        .bind(reason)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
