//! Command implementations

pub mod ci;

pub use ci::run_ci_command;
