use clap::Subcommand;

use crate::cli::utils::print_json;
use crate::cli::OutputFormat;
use crate::config::config;

#[derive(Subcommand)]
pub enum ConfigCommands {
    #[command(about = "Print the effective configuration with secrets masked")]
    Show,
}

pub async fn handle(cmd: ConfigCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        ConfigCommands::Show => {
            let redacted = config().redacted();
            match output_format {
                OutputFormat::Json => print_json(&redacted),
                OutputFormat::Text => {
                    print!("{}", serde_yaml::to_string(&redacted)?);
                    Ok(())
                }
            }
        }
    }
}
