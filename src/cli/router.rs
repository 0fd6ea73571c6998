//! Command routing

use crate::app::AppConfig;
use crate::cli::args::Commands;
use crate::cli::commands::run_ci_command;
use anyhow::Result;

/// Execute a CLI command based on the parsed arguments
pub async fn execute_command(command: Option<Commands>, app: &AppConfig) -> Result<()> {
    match command {
        Some(Commands::Ci { command }) => run_ci_command(command, app).await,
        None => {
            // No command provided, show help
            println!("{}", crate::cli::help::generate_help());
            Ok(())
        }
    }
}
