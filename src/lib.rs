//! # flakeci
//!
//! Local CI for Nix flakes: build, lock-check, and check every configured
//! subflake on this machine or on a remote builder, and derive the matching
//! GitHub Actions job matrix.
//!
//! ## Usage
//!
//! ```bash
//! flakeci ci run [FLAKE] [--systems x86_64-linux,aarch64-darwin] [--parallel] [--remote user@host]
//! flakeci ci gh-matrix [--systems ...]
//! ```
//!
//! ## Modules
//!
//! - `app` - Logging setup and fatal error handling
//! - `ci` - Configuration, step runners, and pipeline orchestration
//! - `cli` - Argument parsing and command implementations
//! - `flake` - Flake URL handling
//! - `subprocess` - Process execution layer (local, nix, ssh) with a mock for tests
pub mod app;
pub mod ci;
pub mod cli;
pub mod flake;
pub mod subprocess;

pub use ci::{generate_matrix, run, CiConfig, CiError, RunOptions, SubflakeResult};
pub use flake::FlakeUrl;
