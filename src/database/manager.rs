use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::database::memory::MemoryStore;
use crate::database::postgres::PgStore;
use crate::database::store::Store;

/// Errors from the persistence layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Builds the store selected by configuration
pub struct DatabaseManager;

impl DatabaseManager {
    /// `memory://` selects the in-process store; anything else must be a Postgres URL
    pub async fn open(config: &DatabaseConfig) -> Result<Arc<dyn Store>, DatabaseError> {
        if config.url.starts_with("memory://") {
            info!("Using in-memory store; data is lost on restart");
            return Ok(Arc::new(MemoryStore::new()));
        }

        let pool = Self::connect(config).await?;
        if config.auto_migrate {
            Self::migrate(&pool).await?;
        }
        Ok(Arc::new(PgStore::new(pool)))
    }

    /// Create the Postgres pool
    pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
        if config.url.trim().is_empty() {
            return Err(DatabaseError::ConfigMissing("DATABASE_URL"));
        }
        let url = url::Url::parse(&config.url).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        if !matches!(url.scheme(), "postgres" | "postgresql") {
            return Err(DatabaseError::InvalidDatabaseUrl);
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect(&config.url)
            .await?;

        info!(
            "Created database pool for: {}{}",
            url.host_str().unwrap_or("localhost"),
            url.path()
        );
        Ok(pool)
    }

    /// Apply the embedded migrations in `migrations/`
    pub async fn migrate(pool: &PgPool) -> Result<(), DatabaseError> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(|e| DatabaseError::MigrationError(e.to_string()))?;
        info!("Database migrations applied");
        Ok(())
    }
}
