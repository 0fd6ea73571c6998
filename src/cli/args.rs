//! CLI argument structures

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Run CI for Nix flakes and their subflakes
#[derive(Parser)]
#[command(name = "flakeci")]
#[command(about = "flakeci - Build and check Nix flakes locally or on a remote builder", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run CI steps or derive a CI job matrix
    Ci {
        #[command(subcommand)]
        command: CiCommands,
    },
}

#[derive(Subcommand)]
pub enum CiCommands {
    /// Build, lock-check, and check every configured subflake
    #[command(name = "run")]
    Run {
        /// Flake to run CI on
        #[arg(default_value = ".")]
        flake: String,

        /// Systems to run for (comma separated; defaults to the current system)
        #[arg(long, value_delimiter = ',')]
        systems: Vec<String>,

        /// Run subflakes concurrently
        #[arg(long)]
        parallel: bool,

        /// Maximum subflakes running at once with --parallel (0 = unbounded)
        #[arg(long, default_value = "0")]
        max_concurrency: usize,

        /// Run every step on this host over ssh (e.g. user@builder)
        #[arg(long, value_name = "HOST")]
        remote: Option<String>,

        /// Print GitHub Actions log groups (default: on inside GitHub Actions)
        #[arg(long)]
        github_output: bool,

        /// Configuration file (defaults to om.yaml in the flake directory)
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,

        /// Where to write the JSON results
        #[arg(short = 'o', long = "out-link", default_value = "result.json")]
        out_link: PathBuf,

        /// Do not write the JSON results file
        #[arg(long)]
        no_link: bool,
    },

    /// Print the GitHub Actions matrix for the configured subflakes
    #[command(name = "gh-matrix")]
    GhMatrix {
        /// Flake whose om.yaml to read
        #[arg(default_value = ".")]
        flake: String,

        /// Systems to include (comma separated; defaults to x86_64-linux)
        #[arg(long, value_delimiter = ',')]
        systems: Vec<String>,

        /// Configuration file (defaults to om.yaml in the flake directory)
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,
    },
}
