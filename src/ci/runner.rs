//! Local step execution
//!
//! A [`StepRunner`] turns one [`Step`] into exactly one [`StepOutcome`].
//! Failures of the underlying command become `success: false` outcomes;
//! nothing a step does is raised to the caller.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::config::CustomStep;
use super::step::{Step, StepOutcome};
use crate::flake::FlakeUrl;
use crate::subprocess::nix::NIX_PROGRAM;
use crate::subprocess::{
    NixRunner, ProcessCommandBuilder, ProcessError, ProcessRunner, SubprocessManager,
};

/// Error text for a custom step with an empty command.
pub const NO_COMMAND: &str = "custom step has no command";

/// Error text for a failed lockfile check.
pub const LOCKFILE_OUT_OF_DATE: &str = "flake.lock is out of date";

#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run_step(&self, flake: &FlakeUrl, step: &Step) -> StepOutcome;
}

/// Runs steps as processes on this machine.
pub struct LocalStepRunner {
    nix: Arc<dyn NixRunner>,
    processes: Arc<dyn ProcessRunner>,
}

impl LocalStepRunner {
    pub fn new(nix: Arc<dyn NixRunner>, processes: Arc<dyn ProcessRunner>) -> Self {
        Self { nix, processes }
    }

    pub fn from_manager(manager: &SubprocessManager) -> Self {
        Self::new(Arc::new(manager.nix()), manager.runner())
    }

    async fn run_custom(
        &self,
        key: String,
        name: &str,
        step: &CustomStep,
        flake: &FlakeUrl,
        started: Instant,
    ) -> StepOutcome {
        let argv = step.argument_vector(name, flake);
        let Some((program, args)) = argv.split_first() else {
            return StepOutcome::failed(key, NO_COMMAND, started.elapsed());
        };

        if program == NIX_PROGRAM {
            return match self.nix.run_structured(args).await {
                Ok(output) => StepOutcome::passed(key, output, started.elapsed()),
                Err(e) => StepOutcome::failed(key, e.to_string(), started.elapsed()),
            };
        }

        let mut builder = ProcessCommandBuilder::new(program).args(args);
        if let Some(dir) = flake.as_local_path() {
            builder = builder.current_dir(dir);
        }
        let command = builder.build();
        let shown = command.display();
        debug!("Running custom step '{}': {}", name, shown);

        match self.processes.run(command).await {
            Ok(output) if output.status.success() => {
                StepOutcome::passed(key, output.combined(), started.elapsed())
            }
            Ok(output) => {
                let error = ProcessError::CommandFailed {
                    command: shown,
                    exit_code: output.status.code(),
                    stderr: output.stderr.trim().to_string(),
                };
                StepOutcome::failed(key, error.to_string(), started.elapsed())
                    .with_output(output.combined())
            }
            Err(e) => StepOutcome::failed(key, e.to_string(), started.elapsed()),
        }
    }
}

#[async_trait]
impl StepRunner for LocalStepRunner {
    async fn run_step(&self, flake: &FlakeUrl, step: &Step) -> StepOutcome {
        let key = step.key();
        let started = Instant::now();
        debug!("Running step {} on {}", key, flake);

        match step {
            Step::Build { impure } => match self.nix.build_all(flake, *impure).await {
                Ok(paths) => StepOutcome::passed(key, paths, started.elapsed()),
                Err(e) => StepOutcome::failed(key, e.to_string(), started.elapsed()),
            },
            Step::Lockfile => match self.nix.lock_check(flake).await {
                Ok(output) => StepOutcome::passed(key, output, started.elapsed()),
                Err(e) => {
                    debug!("Lockfile check for {} failed: {}", flake, e);
                    StepOutcome::failed(key, LOCKFILE_OUT_OF_DATE, started.elapsed())
                        .with_output(e.to_string())
                }
            },
            Step::FlakeCheck => match self.nix.flake_check(flake).await {
                Ok(output) => StepOutcome::passed(key, output, started.elapsed()),
                Err(e) => StepOutcome::failed(key, e.to_string(), started.elapsed()),
            },
            Step::Custom { name, step } => {
                self.run_custom(key, name, step, flake, started).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subprocess::MockProcessRunner;

    fn runner_with(mock: &MockProcessRunner) -> LocalStepRunner {
        LocalStepRunner::from_manager(&SubprocessManager::new(Arc::new(mock.clone())))
    }

    fn flake() -> FlakeUrl {
        FlakeUrl::parse(".").unwrap()
    }

    fn custom(name: &str, step: CustomStep) -> Step {
        Step::Custom {
            name: name.to_string(),
            step,
        }
    }

    #[tokio::test]
    async fn test_build_success_captures_out_paths() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("nix")
            .with_args(|args| args == ["build", ".", "--no-link", "--print-out-paths", "--impure"])
            .returns_stdout("/nix/store/aaa-hello\n")
            .finish();

        let outcome = runner_with(&mock)
            .run_step(&flake(), &Step::Build { impure: true })
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.name, "build");
        assert_eq!(outcome.output, "/nix/store/aaa-hello");
        assert!(outcome.error.is_empty());
    }

    #[tokio::test]
    async fn test_build_failure_is_data() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("nix")
            .returns_exit_code(1)
            .returns_stderr("error: builder failed")
            .finish();

        let outcome = runner_with(&mock)
            .run_step(&flake(), &Step::Build { impure: false })
            .await;

        assert!(!outcome.success);
        assert!(outcome.error.contains("builder failed"));
    }

    #[tokio::test]
    async fn test_lockfile_failure_uses_fixed_message() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("nix")
            .returns_exit_code(1)
            .returns_stderr("error: cannot write modified lock file")
            .finish();

        let outcome = runner_with(&mock).run_step(&flake(), &Step::Lockfile).await;

        assert!(!outcome.success);
        assert_eq!(outcome.error, LOCKFILE_OUT_OF_DATE);
        assert!(outcome.output.contains("cannot write modified lock file"));
    }

    #[tokio::test]
    async fn test_flake_check_failure_is_raw_error() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("nix")
            .with_args(|args| args == ["flake", "check", "."])
            .returns_exit_code(1)
            .returns_stderr("error: checks.x86_64-linux.fmt failed")
            .finish();

        let outcome = runner_with(&mock).run_step(&flake(), &Step::FlakeCheck).await;

        assert!(!outcome.success);
        assert!(outcome.error.contains("checks.x86_64-linux.fmt failed"));
    }

    #[tokio::test]
    async fn test_custom_without_command_spawns_nothing() {
        let mock = MockProcessRunner::new();

        let outcome = runner_with(&mock)
            .run_step(&flake(), &custom("empty", CustomStep::devshell(Vec::<String>::new())))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.name, "custom:empty");
        assert!(outcome.error.contains("no command"));
        assert!(mock.get_call_history().is_empty());
    }

    #[tokio::test]
    async fn test_custom_nix_command_goes_through_nix() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("nix")
            .with_args(|args| args == ["fmt", "--", "--check"])
            .returns_stdout("formatted\n")
            .finish();

        let outcome = runner_with(&mock)
            .run_step(
                &flake(),
                &custom("fmt", CustomStep::devshell(["nix", "fmt", "--", "--check"])),
            )
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.output, "formatted");
    }

    #[tokio::test]
    async fn test_custom_app_runs_flake_app() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("nix").finish();

        let step = CustomStep::app("check-closure-size", Vec::new());
        runner_with(&mock)
            .run_step(&flake(), &custom("size", step))
            .await;

        let calls = mock.get_call_history();
        assert_eq!(calls[0].args, vec!["run", ".#check-closure-size"]);
    }

    #[tokio::test]
    async fn test_custom_command_captures_combined_output() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("just")
            .returns_stdout("running 3 tests\n")
            .returns_stderr("test failed\n")
            .returns_exit_code(101)
            .finish();

        let outcome = runner_with(&mock)
            .run_step(&flake(), &custom("test", CustomStep::devshell(["just", "test"])))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.output, "running 3 tests\ntest failed\n");
        assert!(outcome.error.contains("exit 101"));

        let calls = mock.get_call_history();
        assert_eq!(calls[0].working_dir.as_deref(), Some(std::path::Path::new(".")));
    }

    #[tokio::test]
    async fn test_custom_command_not_found() {
        let runner = LocalStepRunner::from_manager(&SubprocessManager::production());

        let outcome = runner
            .run_step(
                &flake(),
                &custom("missing", CustomStep::devshell(["nonexistent-command-12345"])),
            )
            .await;

        assert!(!outcome.success);
        assert!(!outcome.error.is_empty());
    }
}
