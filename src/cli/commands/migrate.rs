use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::config;
use crate::database::DatabaseManager;

pub async fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    let database = &config().database;
    if database.url.starts_with("memory://") {
        return output_success(output_format, "In-memory store configured; nothing to migrate", None);
    }

    let pool = DatabaseManager::connect(database).await?;
    DatabaseManager::migrate(&pool).await?;
    pool.close().await;

    output_success(output_format, "Migrations applied", None)
}
