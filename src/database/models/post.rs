use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Platform, PostKind, PostStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub platform: Platform,
    pub kind: PostKind,
    pub title: Option<String>,
    pub body: Option<String>,
    pub link: Option<String>,
    pub media_url: Option<String>,
    pub media_content_type: Option<String>,
    pub privacy: Option<String>,
    pub status: PostStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub platform_post_id: Option<String>,
    pub permalink: Option<String>,
    pub container_id: Option<String>,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn new(user_id: Uuid, account_id: Uuid, platform: Platform, kind: PostKind, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            account_id,
            platform,
            kind,
            title: None,
            body: None,
            link: None,
            media_url: None,
            media_content_type: None,
            privacy: None,
            status: PostStatus::Draft,
            scheduled_at: None,
            published_at: None,
            platform_post_id: None,
            permalink: None,
            container_id: None,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Caption text sent to the platform; Instagram and Facebook have no separate title
    pub fn caption(&self) -> Option<&str> {
        self.body.as_deref().filter(|b| !b.trim().is_empty())
    }
}
