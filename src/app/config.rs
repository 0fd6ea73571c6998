//! Application configuration

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Settings derived from global CLI flags and the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Verbosity level for logging
    pub verbose: u8,
    pub working_dir: PathBuf,
    /// Running inside GitHub Actions
    pub github_actions: bool,
}

impl AppConfig {
    pub fn new(verbose: u8) -> Result<Self> {
        let working_dir =
            std::env::current_dir().context("Failed to get current directory")?;

        Ok(Self {
            verbose,
            working_dir,
            github_actions: crate::ci::github::in_github_actions(),
        })
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = dir;
        self
    }

    /// `EnvFilter` directive for the configured verbosity. `RUST_LOG` is
    /// not consulted.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            verbose: 0,
            working_dir: PathBuf::from("."),
            github_actions: false,
        }
    }
}
