pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Relay CLI - administration for the social relay API")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Apply database migrations")]
    Migrate,

    #[command(about = "Inspect the effective configuration")]
    Config {
        #[command(subcommand)]
        cmd: commands::config::ConfigCommands,
    },

    #[command(about = "Run the post scheduler by hand")]
    Scheduler {
        #[command(subcommand)]
        cmd: commands::scheduler::SchedulerCommands,
    },

    #[command(about = "Connected account token maintenance")]
    Tokens {
        #[command(subcommand)]
        cmd: commands::tokens::TokenCommands,
    },

    #[command(about = "Connected accounts of a user")]
    Accounts {
        #[command(subcommand)]
        cmd: commands::accounts::AccountCommands,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Migrate => commands::migrate::handle(output_format).await,
        Commands::Config { cmd } => commands::config::handle(cmd, output_format).await,
        Commands::Scheduler { cmd } => commands::scheduler::handle(cmd, output_format).await,
        Commands::Tokens { cmd } => commands::tokens::handle(cmd, output_format).await,
        Commands::Accounts { cmd } => commands::accounts::handle(cmd, output_format).await,
    }
}
