//! CLI command handlers

pub mod args;
pub mod commands;
pub mod help;
pub mod router;

pub use args::{CiCommands, Cli, Commands};
pub use help::generate_help;
pub use router::execute_command;
