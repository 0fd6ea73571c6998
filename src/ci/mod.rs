//! Local CI for Nix flakes
//!
//! A run resolves each configured subflake, executes its steps through a
//! [`StepRunner`] (local processes, or ssh to a remote host), and returns one
//! [`SubflakeResult`] per subflake. [`generate_matrix`] derives the matching
//! GitHub Actions job matrix from the same configuration.

pub mod config;
pub mod error;
pub mod executor;
pub mod github;
pub mod matrix;
pub mod orchestrator;
pub mod remote;
pub mod report;
pub mod runner;
pub mod step;

pub use config::{load_config, load_config_or_default, CiConfig, CustomStep, CustomStepKind, SubflakeConfig};
pub use error::CiError;
pub use executor::{run_subflake, SubflakeResult};
pub use matrix::{generate_matrix, GitHubMatrix, MatrixRow};
pub use orchestrator::{run, Pipeline, RunOptions};
pub use remote::RemoteStepRunner;
pub use runner::{LocalStepRunner, StepRunner};
pub use step::{Step, StepOutcome};
