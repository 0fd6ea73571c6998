//! Help text generation

use crate::cli::args::Cli;
use clap::CommandFactory;

pub fn generate_help() -> String {
    Cli::command().render_help().to_string()
}
