use async_trait::async_trait;
use std::sync::Arc;

use super::builder::ProcessCommandBuilder;
use super::error::ProcessError;
use super::runner::ProcessRunner;
use crate::flake::FlakeUrl;

pub const NIX_PROGRAM: &str = "nix";

/// The `nix` invocations CI needs.
///
/// Every method returns the command's stdout (trimmed) on success, and a
/// [`ProcessError::CommandFailed`] carrying stderr on a non-zero exit.
#[async_trait]
pub trait NixRunner: Send + Sync {
    async fn build_all(&self, flake: &FlakeUrl, impure: bool) -> Result<String, ProcessError>;
    async fn lock_check(&self, flake: &FlakeUrl) -> Result<String, ProcessError>;
    async fn flake_check(&self, flake: &FlakeUrl) -> Result<String, ProcessError>;
    async fn current_system(&self) -> Result<String, ProcessError>;
    /// Run `nix` with arbitrary arguments (custom steps whose command starts with `nix`).
    async fn run_structured(&self, args: &[String]) -> Result<String, ProcessError>;
}

/// Arguments for building every output of a flake.
pub fn build_all_args(flake: &FlakeUrl, impure: bool) -> Vec<String> {
    let mut args = vec![
        "build".to_string(),
        flake.to_string(),
        "--no-link".to_string(),
        "--print-out-paths".to_string(),
    ];
    if impure {
        args.push("--impure".to_string());
    }
    args
}

pub fn lock_check_args(flake: &FlakeUrl) -> Vec<String> {
    vec![
        "flake".to_string(),
        "lock".to_string(),
        "--no-update-lock-file".to_string(),
        flake.to_string(),
    ]
}

pub fn flake_check_args(flake: &FlakeUrl) -> Vec<String> {
    vec!["flake".to_string(), "check".to_string(), flake.to_string()]
}

pub struct NixCmd {
    runner: Arc<dyn ProcessRunner>,
}

impl NixCmd {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    async fn run(&self, args: &[String]) -> Result<String, ProcessError> {
        let command = ProcessCommandBuilder::new(NIX_PROGRAM).args(args).build();
        let shown = command.display();

        let output = self.runner.run(command).await?;

        if !output.status.success() {
            return Err(ProcessError::CommandFailed {
                command: shown,
                exit_code: output.status.code(),
                stderr: output.stderr.trim().to_string(),
            });
        }

        Ok(output.stdout.trim().to_string())
    }
}

#[async_trait]
impl NixRunner for NixCmd {
    async fn build_all(&self, flake: &FlakeUrl, impure: bool) -> Result<String, ProcessError> {
        self.run(&build_all_args(flake, impure)).await
    }

    async fn lock_check(&self, flake: &FlakeUrl) -> Result<String, ProcessError> {
        self.run(&lock_check_args(flake)).await
    }

    async fn flake_check(&self, flake: &FlakeUrl) -> Result<String, ProcessError> {
        self.run(&flake_check_args(flake)).await
    }

    async fn current_system(&self) -> Result<String, ProcessError> {
        self.run(&[
            "eval".to_string(),
            "--impure".to_string(),
            "--raw".to_string(),
            "--expr".to_string(),
            "builtins.currentSystem".to_string(),
        ])
        .await
    }

    async fn run_structured(&self, args: &[String]) -> Result<String, ProcessError> {
        self.run(args).await
    }
}
