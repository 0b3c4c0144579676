use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use crate::database::models::{ConnectedAccount, Post};
use crate::services::account_service::AccountService;
use crate::services::error::ServiceError;
use crate::services::media_service::{content_type_for_key, MediaService};
use crate::state::AppState;
use crate::types::{Platform, PostKind, PostStatus};

pub const FACEBOOK_MAX_MESSAGE: usize = 63_206;
pub const INSTAGRAM_MAX_CAPTION: usize = 2_200;
pub const YOUTUBE_MAX_TITLE: usize = 100;
pub const YOUTUBE_MAX_DESCRIPTION: usize = 5_000;
pub const YOUTUBE_PRIVACY: [&str; 3] = ["public", "unlisted", "private"];

const EDITABLE: [PostStatus; 3] = [PostStatus::Draft, PostStatus::Scheduled, PostStatus::Failed];

#[derive(Debug, Deserialize)]
pub struct CreatePost {
    pub account_id: Uuid,
    pub kind: PostKind,
    pub title: Option<String>,
    pub body: Option<String>,
    pub link: Option<String>,
    pub media_url: Option<String>,
    /// Uploaded media to attach instead of a URL
    pub media_id: Option<Uuid>,
    pub privacy: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePost {
    pub account_id: Option<Uuid>,
    pub kind: Option<PostKind>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub link: Option<String>,
    pub media_url: Option<String>,
    pub media_id: Option<Uuid>,
    pub privacy: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn too_long(value: Option<&str>, limit: usize) -> bool {
    value.is_some_and(|v| v.chars().count() > limit)
}

/// Check a post's content against the rules of its platform
pub fn validate_content(post: &Post) -> Result<(), ServiceError> {
    let mut errors = HashMap::new();
    let mut fail = |field: &str, message: String| {
        errors.entry(field.to_string()).or_insert(message);
    };

    if post.kind.needs_media() && post.media_url.is_none() {
        fail("media_url", format!("{} posts need media", post.kind));
    }
    if let Some(content_type) = post.media_content_type.as_deref() {
        let matches_kind = if post.kind.is_video() {
            content_type.starts_with("video/")
        } else {
            content_type.starts_with("image/")
        };
        if post.kind.needs_media() && !matches_kind {
            fail("media_url", format!("{} media cannot be used for a {} post", content_type, post.kind));
        }
    }
    if let Some(link) = post.link.as_deref() {
        if !matches!(url::Url::parse(link).map(|u| u.scheme().to_string()).as_deref(), Ok("http" | "https")) {
            fail("link", "link must be an http(s) URL".to_string());
        }
    }

    match post.platform {
        Platform::Facebook => {
            match post.kind {
                PostKind::Text if post.caption().is_none() => fail("body", "text posts need a body".to_string()),
                PostKind::Link if post.link.is_none() => fail("link", "link posts need a link".to_string()),
                PostKind::Reel => fail("kind", "Facebook reels are not supported; use video".to_string()),
                _ => {}
            }
            if too_long(post.body.as_deref(), FACEBOOK_MAX_MESSAGE) {
                fail("body", format!("body exceeds {} characters", FACEBOOK_MAX_MESSAGE));
            }
        }
        Platform::Instagram => {
            if !post.kind.needs_media() {
                fail("kind", format!("Instagram does not accept {} posts", post.kind));
            }
            if too_long(post.body.as_deref(), INSTAGRAM_MAX_CAPTION) {
                fail("body", format!("caption exceeds {} characters", INSTAGRAM_MAX_CAPTION));
            }
        }
        Platform::YouTube => {
            if post.kind != PostKind::Video {
                fail("kind", "YouTube only accepts video posts".to_string());
            }
            match post.title.as_deref() {
                None => fail("title", "YouTube videos need a title".to_string()),
                Some(title) if title.chars().count() > YOUTUBE_MAX_TITLE => {
                    fail("title", format!("title exceeds {} characters", YOUTUBE_MAX_TITLE))
                }
                Some(title) if title.contains(['<', '>']) => {
                    fail("title", "title cannot contain '<' or '>'".to_string())
                }
                _ => {}
            }
            if too_long(post.body.as_deref(), YOUTUBE_MAX_DESCRIPTION) {
                fail("body", format!("description exceeds {} characters", YOUTUBE_MAX_DESCRIPTION));
            }
            if let Some(privacy) = post.privacy.as_deref() {
                if !YOUTUBE_PRIVACY.contains(&privacy) {
                    fail("privacy", format!("privacy must be one of {}", YOUTUBE_PRIVACY.join(", ")));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::FieldErrors(errors))
    }
}

/// Composition and publication state of posts
pub struct PostService {
    state: AppState,
}

impl PostService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    fn min_lead(&self) -> Duration {
        Duration::seconds(self.state.config.scheduler.min_lead_secs)
    }

    fn check_schedule_time(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), ServiceError> {
        if at < now + self.min_lead() {
            return Err(ServiceError::validation(format!(
                "scheduled_at must be at least {} seconds in the future",
                self.state.config.scheduler.min_lead_secs
            )));
        }
        Ok(())
    }

    async fn account_for(&self, user_id: Uuid, account_id: Uuid) -> Result<ConnectedAccount, ServiceError> {
        AccountService::new(self.state.clone()).owned(user_id, account_id).await
    }

    async fn attach_media(&self, user_id: Uuid, post: &mut Post, media_id: Uuid) -> Result<(), ServiceError> {
        let media = MediaService::new(self.state.clone()).get(user_id, media_id).await?;
        post.media_url = Some(media.public_url);
        post.media_content_type = Some(media.content_type);
        Ok(())
    }

    fn set_media_url(post: &mut Post, url: Option<String>) {
        post.media_content_type = url.as_deref().and_then(content_type_for_key).map(str::to_string);
        post.media_url = url;
    }

    pub async fn owned(&self, user_id: Uuid, id: Uuid) -> Result<Post, ServiceError> {
        self.state
            .store
            .find_post(id)
            .await?
            .filter(|p| p.user_id == user_id)
            .ok_or_else(|| ServiceError::not_found("post"))
    }

    pub async fn list(&self, user_id: Uuid, status: Option<PostStatus>) -> Result<Vec<Post>, ServiceError> {
        Ok(self.state.store.list_posts(user_id, status).await?)
    }

    /// A draft, or a scheduled post when `scheduled_at` is given
    pub async fn create(&self, user_id: Uuid, input: CreatePost) -> Result<Post, ServiceError> {
        let account = self.account_for(user_id, input.account_id).await?;
        let now = Utc::now();

        let mut post = Post::new(user_id, account.id, account.platform, input.kind, now);
        post.title = non_blank(input.title);
        post.body = non_blank(input.body);
        post.link = non_blank(input.link);
        post.privacy = non_blank(input.privacy);
        Self::set_media_url(&mut post, non_blank(input.media_url));
        if let Some(media_id) = input.media_id {
            self.attach_media(user_id, &mut post, media_id).await?;
        }
        validate_content(&post)?;

        if let Some(at) = input.scheduled_at {
            self.check_schedule_time(at, now)?;
            post.status = PostStatus::Scheduled;
            post.scheduled_at = Some(at);
        }

        self.state.store.insert_post(&post).await?;
        info!("Created {} {} post {} ({})", post.platform, post.kind, post.id, post.status);
        Ok(post)
    }

    pub async fn update(&self, user_id: Uuid, id: Uuid, input: UpdatePost) -> Result<Post, ServiceError> {
        let mut post = self.owned(user_id, id).await?;
        if !post.status.is_editable() {
            return Err(ServiceError::Conflict(format!("{} posts cannot be edited", post.status)));
        }

        if let Some(account_id) = input.account_id {
            let account = self.account_for(user_id, account_id).await?;
            post.account_id = account.id;
            post.platform = account.platform;
        }
        if let Some(kind) = input.kind {
            post.kind = kind;
        }
        if input.title.is_some() {
            post.title = non_blank(input.title);
        }
        if input.body.is_some() {
            post.body = non_blank(input.body);
        }
        if input.link.is_some() {
            post.link = non_blank(input.link);
        }
        if input.privacy.is_some() {
            post.privacy = non_blank(input.privacy);
        }
        if input.media_url.is_some() {
            Self::set_media_url(&mut post, non_blank(input.media_url));
        }
        if let Some(media_id) = input.media_id {
            self.attach_media(user_id, &mut post, media_id).await?;
        }
        validate_content(&post)?;

        post.updated_at = Utc::now();
        match self.state.store.update_post_content(&post, &EDITABLE).await? {
            Some(stored) => Ok(stored),
            None => {
                // claimed by the scheduler or changed while the edit was prepared
                let current = self.owned(user_id, id).await?;
                Err(ServiceError::Conflict(format!("{} posts cannot be edited", current.status)))
            }
        }
    }

    /// Conditional status change; fails when the post moved on meanwhile
    pub(crate) async fn transition(&self, post: &Post, from: &[PostStatus], to: PostStatus) -> Result<Post, ServiceError> {
        if !from.contains(&post.status) {
            return Err(ServiceError::InvalidTransition { from: post.status, to });
        }
        match self.state.store.transition_post(post.id, from, to, Utc::now()).await? {
            Some(moved) => Ok(moved),
            None => {
                let current = self.state.store.find_post(post.id).await?.map_or(post.status, |p| p.status);
                Err(ServiceError::InvalidTransition { from: current, to })
            }
        }
    }

    /// Status and `scheduled_at` change together, so a tick never sees the old time
    async fn reschedule(
        &self,
        post: &Post,
        from: &[PostStatus],
        to: PostStatus,
        at: Option<DateTime<Utc>>,
    ) -> Result<Post, ServiceError> {
        if !from.contains(&post.status) {
            return Err(ServiceError::InvalidTransition { from: post.status, to });
        }
        match self.state.store.reschedule_post(post.id, from, to, at, Utc::now()).await? {
            Some(moved) => Ok(moved),
            None => {
                let current = self.state.store.find_post(post.id).await?.map_or(post.status, |p| p.status);
                Err(ServiceError::InvalidTransition { from: current, to })
            }
        }
    }

    /// Schedule or reschedule; failed posts start over with a fresh attempt count
    pub async fn schedule(&self, user_id: Uuid, id: Uuid, at: DateTime<Utc>) -> Result<Post, ServiceError> {
        let post = self.owned(user_id, id).await?;
        self.check_schedule_time(at, Utc::now())?;
        validate_content(&post)?;

        let post = self.reschedule(&post, &EDITABLE, PostStatus::Scheduled, Some(at)).await?;
        info!("Scheduled post {} for {}", post.id, at);
        Ok(post)
    }

    pub async fn unschedule(&self, user_id: Uuid, id: Uuid) -> Result<Post, ServiceError> {
        let post = self.owned(user_id, id).await?;
        self.reschedule(&post, &[PostStatus::Scheduled], PostStatus::Draft, None).await
    }

    pub async fn cancel(&self, user_id: Uuid, id: Uuid) -> Result<Post, ServiceError> {
        let post = self.owned(user_id, id).await?;
        let post = self.transition(&post, &EDITABLE, PostStatus::Cancelled).await?;
        info!("Cancelled post {}", post.id);
        Ok(post)
    }

    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), ServiceError> {
        let post = self.owned(user_id, id).await?;
        if post.status == PostStatus::Publishing {
            return Err(ServiceError::Conflict("post is being published".into()));
        }
        self.state.store.delete_post(post.id).await?;
        Ok(())
    }
}
