//! Remote step execution over ssh
//!
//! Each step is turned into the same argument vector the local runner would
//! execute, then handed to a [`RemoteShell`] which quotes it for the remote
//! shell. Outcomes have exactly the shape [`super::LocalStepRunner`] produces.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::runner::{StepRunner, LOCKFILE_OUT_OF_DATE, NO_COMMAND};
use super::step::{Step, StepOutcome};
use crate::flake::FlakeUrl;
use crate::subprocess::nix::{build_all_args, flake_check_args, lock_check_args, NIX_PROGRAM};
use crate::subprocess::remote::SSH_TRANSPORT_FAILURE;
use crate::subprocess::{ProcessError, RemoteShell, SubprocessManager};

pub struct RemoteStepRunner {
    host: String,
    shell: Arc<dyn RemoteShell>,
}

impl RemoteStepRunner {
    pub fn new(host: impl Into<String>, shell: Arc<dyn RemoteShell>) -> Self {
        Self {
            host: host.into(),
            shell,
        }
    }

    pub fn from_manager(host: impl Into<String>, manager: &SubprocessManager) -> Self {
        Self::new(host, Arc::new(manager.ssh()))
    }

    fn transport_error(&self, detail: impl std::fmt::Display) -> String {
        format!("remote execution on {} failed: {}", self.host, detail)
    }
}

fn nix_argv(args: Vec<String>) -> Vec<String> {
    let mut argv = Vec::with_capacity(args.len() + 1);
    argv.push(NIX_PROGRAM.to_string());
    argv.extend(args);
    argv
}

/// Prefix for a command that ran remotely and exited non-zero.
fn failure_prefix(step: &Step) -> &'static str {
    match step {
        Step::Build { .. } => "remote build failed",
        Step::Lockfile => "remote lockfile check failed",
        Step::FlakeCheck => "remote flake check failed",
        Step::Custom { .. } => "remote custom step failed",
    }
}

#[async_trait]
impl StepRunner for RemoteStepRunner {
    async fn run_step(&self, flake: &FlakeUrl, step: &Step) -> StepOutcome {
        let key = step.key();
        let started = Instant::now();

        let argv = match step {
            Step::Build { impure } => nix_argv(build_all_args(flake, *impure)),
            Step::Lockfile => nix_argv(lock_check_args(flake)),
            Step::FlakeCheck => nix_argv(flake_check_args(flake)),
            Step::Custom { name, step } => step.argument_vector(name, flake),
        };
        if argv.is_empty() {
            return StepOutcome::failed(key, NO_COMMAND, started.elapsed());
        }

        debug!("Running step {} on {} via {}", key, flake, self.host);
        let output = match self.shell.exec(&self.host, &argv).await {
            Ok(output) => output,
            Err(
                e @ (ProcessError::RemoteHostNotSpecified | ProcessError::InvalidRemoteHost(_)),
            ) => {
                return StepOutcome::failed(key, e.to_string(), started.elapsed());
            }
            Err(e) => {
                warn!("Could not reach {}: {}", self.host, e);
                return StepOutcome::failed(key, self.transport_error(e), started.elapsed());
            }
        };

        if output.status.success() {
            return StepOutcome::passed(key, output.combined(), started.elapsed());
        }

        let combined = output.combined();
        if output.status.code() == Some(SSH_TRANSPORT_FAILURE) {
            let error = self.transport_error(format!("ssh exited with status {SSH_TRANSPORT_FAILURE}"));
            return StepOutcome::failed(key, error, started.elapsed()).with_output(combined);
        }

        let error = match step {
            Step::Lockfile => LOCKFILE_OUT_OF_DATE.to_string(),
            _ => {
                let detail = match output.status.code() {
                    Some(code) => format!("exit {code}"),
                    None => "terminated by signal".to_string(),
                };
                let stderr = output.stderr.trim();
                if stderr.is_empty() {
                    format!("{}: {}", failure_prefix(step), detail)
                } else {
                    format!("{}: {}: {}", failure_prefix(step), detail, stderr)
                }
            }
        };
        StepOutcome::failed(key, error, started.elapsed()).with_output(combined)
    }
}
