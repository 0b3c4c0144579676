use chrono::Utc;
use clap::Subcommand;

use crate::cli::utils::{open_state, print_json};
use crate::cli::OutputFormat;
use crate::services::Scheduler;

#[derive(Subcommand)]
pub enum SchedulerCommands {
    #[command(about = "Run one scheduler pass and print what it did")]
    Tick,
}

pub async fn handle(cmd: SchedulerCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        SchedulerCommands::Tick => {
            let state = open_state().await?;
            let report = Scheduler::new(state).tick(Utc::now()).await?;

            match output_format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Text => {
                    println!("{:<18} {}", "purged states", report.purged_states);
                    println!("{:<18} {}", "stale failed", report.stale_failed);
                    println!("{:<18} {}", "claimed", report.claimed);
                    println!("{:<18} {}", "published", report.published);
                    println!("{:<18} {}", "retrying", report.retried);
                    println!("{:<18} {}", "failed", report.failed);
                    println!("{:<18} {}", "tokens refreshed", report.tokens_refreshed);
                    println!("{:<18} {}", "token failures", report.token_failures);
                }
            }
            Ok(())
        }
    }
}
