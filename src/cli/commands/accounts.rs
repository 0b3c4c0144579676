use clap::Subcommand;

use crate::cli::utils::{open_state, output_empty_collection, print_json};
use crate::cli::OutputFormat;
use crate::services::auth_service::normalize_email;
use crate::services::AccountService;

#[derive(Subcommand)]
pub enum AccountCommands {
    #[command(about = "List the connected accounts of a user")]
    List {
        #[arg(long, help = "Email of the user")]
        email: String,
    },
}

pub async fn handle(cmd: AccountCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        AccountCommands::List { email } => {
            let state = open_state().await?;
            let email = normalize_email(&email)?;
            let user = state
                .store
                .find_user_by_email(&email)
                .await?
                .ok_or_else(|| anyhow::anyhow!("No user with email '{}'", email))?;

            let accounts = AccountService::new(state).list(user.id).await?;
            if accounts.is_empty() {
                return output_empty_collection(output_format, "accounts", "No connected accounts");
            }

            match output_format {
                OutputFormat::Json => print_json(&serde_json::json!({ "accounts": accounts }))?,
                OutputFormat::Text => {
                    println!("{:<36} {:<10} {:<25} {:<25} {}", "ID", "PLATFORM", "NAME", "EXPIRES", "STATUS");
                    println!("{}", "-".repeat(110));
                    for account in &accounts {
                        let expires = account
                            .expires_at
                            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                            .unwrap_or_else(|| "never".to_string());
                        let status = if account.needs_reauth { "reconnect" } else { "ok" };
                        println!(
                            "{:<36} {:<10} {:<25} {:<25} {}",
                            account.id, account.platform, account.display_name, expires, status
                        );
                    }
                }
            }
            Ok(())
        }
    }
}
