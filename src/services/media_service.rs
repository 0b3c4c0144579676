use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::database::models::MediaObject;
use crate::platforms::{http::build_client, MediaPayload};
use crate::services::error::ServiceError;
use crate::state::AppState;

/// Accepted upload types and the extension they are stored under
pub const ALLOWED_TYPES: [(&str, &str); 7] = [
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("video/mp4", "mp4"),
    ("video/quicktime", "mov"),
    ("video/webm", "webm"),
];

const FETCH_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Media is {size} bytes; the limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("Unsupported media type '{0}'")]
    UnsupportedType(String),

    #[error("Invalid media key '{0}'")]
    InvalidKey(String),

    #[error("Media '{0}' not found")]
    NotFound(String),

    #[error("Could not fetch media: {0}")]
    Fetch(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub fn extension_for(content_type: &str) -> Option<&'static str> {
    ALLOWED_TYPES
        .iter()
        .find(|(mime, _)| *mime == content_type)
        .map(|(_, ext)| *ext)
}

pub fn content_type_for_key(key: &str) -> Option<&'static str> {
    let ext = key.rsplit_once('.')?.1;
    ALLOWED_TYPES
        .iter()
        .find(|(_, e)| e.eq_ignore_ascii_case(ext))
        .map(|(mime, _)| *mime)
}

/// Storage backend for uploaded media
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), MediaError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, MediaError>;
    async fn delete(&self, key: &str) -> Result<(), MediaError>;
}

/// Media stored as files under a root directory
pub struct LocalMediaStore {
    root: PathBuf,
}

impl LocalMediaStore {
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, MediaError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, MediaError> {
        let valid = !key.is_empty()
            && !key.starts_with('/')
            && key.split('/').all(|part| !part.is_empty() && part != "." && part != "..")
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
        if !valid {
            return Err(MediaError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), MediaError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, MediaError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(MediaError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), MediaError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct MediaService {
    state: AppState,
}

impl MediaService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/media/{}", self.state.config.media.public_base_url.trim_end_matches('/'), key)
    }

    pub async fn upload(
        &self,
        user_id: Uuid,
        content_type: &str,
        bytes: &[u8],
        file_name: Option<String>,
    ) -> Result<MediaObject, ServiceError> {
        let content_type = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        let ext = extension_for(&content_type).ok_or_else(|| MediaError::UnsupportedType(content_type.clone()))?;

        let limit = self.state.config.media.max_upload_bytes;
        if bytes.len() > limit {
            return Err(MediaError::TooLarge { size: bytes.len(), limit }.into());
        }
        if bytes.is_empty() {
            return Err(ServiceError::validation("media body is empty"));
        }

        let id = Uuid::new_v4();
        let key = format!("{}/{}.{}", user_id, id, ext);
        self.state.media.put(&key, bytes).await?;

        let media = MediaObject {
            id,
            user_id,
            file_name,
            content_type,
            size_bytes: bytes.len() as i64,
            public_url: self.public_url(&key),
            storage_key: key,
            created_at: Utc::now(),
        };
        if let Err(e) = self.state.store.insert_media(&media).await {
            // keep storage and rows in step
            let _ = self.state.media.delete(&media.storage_key).await;
            return Err(e.into());
        }

        info!("Stored media {} ({} bytes, {})", media.id, media.size_bytes, media.content_type);
        Ok(media)
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<MediaObject>, ServiceError> {
        Ok(self.state.store.list_media(user_id).await?)
    }

    /// Media owned by the user; anything else reads as missing
    pub async fn get(&self, user_id: Uuid, id: Uuid) -> Result<MediaObject, ServiceError> {
        self.state
            .store
            .find_media(id)
            .await?
            .filter(|m| m.user_id == user_id)
            .ok_or_else(|| ServiceError::not_found("media"))
    }

    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), ServiceError> {
        let media = self.get(user_id, id).await?;
        self.state.media.delete(&media.storage_key).await?;
        self.state.store.delete_media(media.id).await?;
        info!("Deleted media {}", media.id);
        Ok(())
    }

    /// Bytes behind a public URL: local media comes from the store, anything else is fetched
    pub async fn read_url(&self, url: &str) -> Result<MediaPayload, ServiceError> {
        let local_prefix = self.public_url("");
        if let Some(key) = url.strip_prefix(&local_prefix) {
            let bytes = self.state.media.get(key).await?;
            let content_type = content_type_for_key(key).unwrap_or("application/octet-stream");
            return Ok(MediaPayload {
                content_type: content_type.to_string(),
                bytes,
            });
        }

        let parsed = url::Url::parse(url).map_err(|_| ServiceError::validation(format!("invalid media url '{}'", url)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ServiceError::validation("media url must be http or https"));
        }
        Ok(self.fetch(parsed).await?)
    }

    async fn fetch(&self, url: url::Url) -> Result<MediaPayload, MediaError> {
        let limit = self.state.config.media.max_fetch_bytes;
        let client = build_client(Duration::from_secs(FETCH_TIMEOUT_SECS)).map_err(|e| MediaError::Fetch(e.to_string()))?;

        debug!("Fetching remote media from {}", url.host_str().unwrap_or_default());
        let response = client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| MediaError::Fetch(e.to_string()))?;

        if let Some(len) = response.content_length() {
            if len as usize > limit {
                return Err(MediaError::TooLarge { size: len as usize, limit });
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or_default().trim().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let bytes = response.bytes().await.map_err(|e| MediaError::Fetch(e.to_string()))?;
        if bytes.len() > limit {
            return Err(MediaError::TooLarge { size: bytes.len(), limit });
        }

        Ok(MediaPayload {
            content_type,
            bytes: bytes.to_vec(),
        })
    }
}
