//! Application module
//!
//! Process-wide concerns shared by every command: verbosity, logging setup,
//! and turning fatal errors into exit codes.

pub mod config;
pub mod error_handling;
pub mod logging;

pub use config::AppConfig;
pub use error_handling::{exit_code_for, handle_fatal_error};
pub use logging::init_logging;
