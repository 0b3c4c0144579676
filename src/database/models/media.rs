use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MediaObject {
    pub id: Uuid,
    pub user_id: Uuid,
    pub file_name: Option<String>,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_key: String,
    pub public_url: String,
    pub created_at: DateTime<Utc>,
}
