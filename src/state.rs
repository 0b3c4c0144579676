use std::sync::Arc;

use crate::config::AppConfig;
use crate::database::{DatabaseManager, Store};
use crate::platforms::PlatformClients;
use crate::services::media_service::{LocalMediaStore, MediaStore};

/// Shared handles passed to handlers, services and the scheduler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub media: Arc<dyn MediaStore>,
    pub platforms: Arc<PlatformClients>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn Store>,
        media: Arc<dyn MediaStore>,
        platforms: PlatformClients,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            media,
            platforms: Arc::new(platforms),
        }
    }

    /// Open the configured store, media root and platform clients
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let store = DatabaseManager::open(&config.database).await?;
        let media = LocalMediaStore::open(&config.media.root_dir).await?;
        let platforms = PlatformClients::new(&config.platforms)?;
        Ok(Self::new(config, store, Arc::new(media), platforms))
    }
}
