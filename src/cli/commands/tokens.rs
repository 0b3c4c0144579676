use chrono::Utc;
use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::{open_state, output_success};
use crate::cli::OutputFormat;
use crate::services::TokenService;

#[derive(Subcommand)]
pub enum TokenCommands {
    #[command(about = "Refresh every token that expires within the refresh lead window")]
    Refresh,
}

pub async fn handle(cmd: TokenCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        TokenCommands::Refresh => {
            let state = open_state().await?;
            let report = TokenService::new(state).refresh_due_accounts(Utc::now()).await?;

            output_success(
                output_format,
                &format!(
                    "{} refreshed, {} need reauthorization, {} failed",
                    report.refreshed, report.reauth_required, report.failed
                ),
                Some(json!({ "report": report })),
            )
        }
    }
}
