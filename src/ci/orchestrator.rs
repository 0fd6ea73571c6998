//! Pipeline orchestration
//!
//! Picks the subflakes that apply to the requested systems and runs them
//! one at a time, all at once, or at most `max_concurrency` at a time.
//!
//! Step failures are recorded in the returned results. A structural error
//! from any subflake aborts the whole run, as does cancellation.

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::{CiConfig, SubflakeConfig};
use super::error::CiError;
use super::executor::{run_subflake, SubflakeResult};
use super::github::in_log_group;
use super::remote::RemoteStepRunner;
use super::runner::{LocalStepRunner, StepRunner};
use crate::flake::FlakeUrl;
use crate::subprocess::SubprocessManager;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub systems: Vec<String>,
    pub parallel: bool,
    /// Upper bound on subflakes in flight when `parallel`; 0 means unbounded.
    pub max_concurrency: usize,
    /// Run every step on this host over ssh instead of locally.
    pub remote_host: Option<String>,
    pub github_output: bool,
}

/// Subflakes that will run for `systems`, in name order.
pub fn select_subflakes<'a>(
    config: &'a CiConfig,
    systems: &'a [String],
) -> Vec<(&'a str, &'a SubflakeConfig)> {
    config
        .default
        .iter()
        .filter(|(name, subflake)| {
            if subflake.skip {
                debug!("Skipping subflake '{}'", name);
                return false;
            }
            if !subflake.can_run_on(systems) {
                debug!("Skipping subflake '{}': not enabled for {:?}", name, systems);
                return false;
            }
            true
        })
        .map(|(name, subflake)| (name.as_str(), subflake))
        .collect()
}

pub struct Pipeline {
    processes: SubprocessManager,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(processes: SubprocessManager) -> Self {
        Self {
            processes,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops this pipeline when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Build the step runner `options` ask for.
    fn step_runner(&self, options: &RunOptions) -> Result<Arc<dyn StepRunner>, CiError> {
        match options.remote_host.as_deref() {
            Some(host) if host.trim().is_empty() => Err(CiError::RemoteHostNotSpecified),
            Some(host) => {
                info!("Running steps on remote host {}", host);
                Ok(Arc::new(RemoteStepRunner::from_manager(
                    host.trim(),
                    &self.processes,
                )))
            }
            None => Ok(Arc::new(LocalStepRunner::from_manager(&self.processes))),
        }
    }

    pub async fn run(
        &self,
        flake: &FlakeUrl,
        config: &CiConfig,
        options: &RunOptions,
    ) -> Result<Vec<SubflakeResult>, CiError> {
        let runner = self.step_runner(options)?;
        self.run_with_runner(runner.as_ref(), flake, config, options)
            .await
    }

    pub async fn run_with_runner(
        &self,
        runner: &dyn StepRunner,
        flake: &FlakeUrl,
        config: &CiConfig,
        options: &RunOptions,
    ) -> Result<Vec<SubflakeResult>, CiError> {
        let selected = select_subflakes(config, &options.systems);
        if selected.is_empty() {
            info!("No subflakes to run for {:?}", options.systems);
            return Ok(Vec::new());
        }
        info!(
            "Running {} subflake(s) of {} for {:?}",
            selected.len(),
            flake,
            options.systems
        );

        let dispatch = async {
            if options.parallel {
                run_concurrent(runner, flake, &selected, options).await
            } else {
                run_sequential(runner, flake, &selected, options).await
            }
        };

        // Dropping `dispatch` drops every in-flight step, which kills its process
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                warn!("CI run cancelled");
                Err(CiError::Cancelled)
            }
            results = dispatch => results,
        }
    }
}

async fn run_sequential(
    runner: &dyn StepRunner,
    flake: &FlakeUrl,
    selected: &[(&str, &SubflakeConfig)],
    options: &RunOptions,
) -> Result<Vec<SubflakeResult>, CiError> {
    let mut results = Vec::with_capacity(selected.len());
    for (name, subflake) in selected {
        let result = in_log_group(
            &format!("subflake={name}"),
            options.github_output,
            run_subflake(runner, flake, name, subflake, &options.systems),
        )
        .await?;
        results.push(result);
    }
    Ok(results)
}

async fn run_concurrent(
    runner: &dyn StepRunner,
    flake: &FlakeUrl,
    selected: &[(&str, &SubflakeConfig)],
    options: &RunOptions,
) -> Result<Vec<SubflakeResult>, CiError> {
    let limiter = (options.max_concurrency > 0).then(|| Semaphore::new(options.max_concurrency));
    debug!(
        "Running subflakes concurrently (limit: {})",
        match options.max_concurrency {
            0 => "none".to_string(),
            n => n.to_string(),
        }
    );

    let mut pending: FuturesUnordered<_> = selected
        .iter()
        .enumerate()
        .map(|(index, (name, subflake))| {
            let limiter = limiter.as_ref();
            async move {
                // Held until this subflake finishes or is dropped. The
                // semaphore is never closed, so acquiring only ever waits.
                let _permit = match limiter {
                    Some(semaphore) => semaphore.acquire().await.ok(),
                    None => None,
                };
                let result = run_subflake(runner, flake, name, subflake, &options.systems).await?;
                Ok::<_, CiError>((index, result))
            }
        })
        .collect();

    let mut finished = Vec::with_capacity(selected.len());
    while let Some(next) = pending.next().await {
        // Returning early drops the subflakes still running
        let (index, result) = next?;
        finished.push((index, result));
    }

    finished.sort_by_key(|(index, _)| *index);
    Ok(finished.into_iter().map(|(_, result)| result).collect())
}

/// Run `config` against `flake` with real processes.
pub async fn run(
    flake: &FlakeUrl,
    config: &CiConfig,
    options: &RunOptions,
) -> Result<Vec<SubflakeResult>, CiError> {
    Pipeline::new(SubprocessManager::production())
        .run(flake, config, options)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ci::config::CustomStep;
    use crate::subprocess::MockProcessRunner;
    use std::time::{Duration, Instant};

    fn linux() -> Vec<String> {
        vec!["x86_64-linux".to_string()]
    }

    fn root() -> FlakeUrl {
        FlakeUrl::parse(".").unwrap()
    }

    /// A subflake whose only step is a custom command.
    fn custom_only(command: &[&str]) -> SubflakeConfig {
        let mut subflake = SubflakeConfig::default();
        subflake.steps.build.enable = false;
        subflake.steps.lockfile.enable = false;
        subflake.steps.flake_check.enable = false;
        subflake
            .steps
            .custom
            .insert("work".to_string(), CustomStep::devshell(command.iter().copied()));
        subflake
    }

    fn config_of(subflakes: Vec<(&str, SubflakeConfig)>) -> CiConfig {
        CiConfig {
            default: subflakes
                .into_iter()
                .map(|(name, s)| (name.to_string(), s))
                .collect(),
        }
    }

    fn pipeline(mock: &MockProcessRunner) -> Pipeline {
        Pipeline::new(SubprocessManager::new(Arc::new(mock.clone())))
    }

    fn slow_work(count: usize) -> (MockProcessRunner, CiConfig) {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("work")
            .delayed_by(Duration::from_millis(50))
            .finish();
        let config = config_of(
            (0..count)
                .map(|i| (["a", "b", "c", "d", "e", "f"][i], custom_only(&["work"])))
                .collect(),
        );
        (mock, config)
    }

    fn options(parallel: bool, max_concurrency: usize) -> RunOptions {
        RunOptions {
            systems: linux(),
            parallel,
            max_concurrency,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_all_skipped_returns_empty() {
        let mock = MockProcessRunner::new();
        let mut skipped = SubflakeConfig::default();
        skipped.skip = true;
        let config = config_of(vec![(".", skipped.clone()), ("tests", skipped)]);

        for opts in [options(false, 0), options(true, 0), options(true, 2)] {
            let results = pipeline(&mock).run(&root(), &config, &opts).await.unwrap();
            assert!(results.is_empty());
        }
        assert!(mock.get_call_history().is_empty());
    }

    #[tokio::test]
    async fn test_whitelist_excludes_subflake() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("work").finish();
        let mut darwin = custom_only(&["work"]);
        darwin.systems = vec!["aarch64-darwin".to_string()];
        let config = config_of(vec![("linux", custom_only(&["work"])), ("mac", darwin)]);

        let results = pipeline(&mock)
            .run(&root(), &config, &options(false, 0))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].subflake, "linux");
    }

    #[tokio::test]
    async fn test_sequential_preserves_order() {
        let (mock, config) = slow_work(3);

        let results = pipeline(&mock)
            .run(&root(), &config, &options(false, 0))
            .await
            .unwrap();

        let names: Vec<_> = results.iter().map(|r| r.subflake.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(mock.max_concurrent_calls(), 1);
    }

    #[tokio::test]
    async fn test_unbounded_runs_everything_at_once() {
        let (mock, config) = slow_work(5);

        let results = pipeline(&mock)
            .run(&root(), &config, &options(true, 0))
            .await
            .unwrap();

        assert_eq!(results.len(), 5);
        assert_eq!(mock.max_concurrent_calls(), 5);
    }

    #[tokio::test]
    async fn test_bounded_never_exceeds_limit() {
        let (mock, config) = slow_work(6);

        let started = Instant::now();
        let results = pipeline(&mock)
            .run(&root(), &config, &options(true, 2))
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(results.len(), 6);
        assert!(results.iter().all(|r| r.success));
        assert_eq!(mock.max_concurrent_calls(), 2);
        // ceil(6 / 2) rounds of 50ms, far below six sequential rounds
        assert!(elapsed < Duration::from_millis(290), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_concurrent_results_follow_config_order() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("work")
            .with_args(|args| args == ["slow"])
            .delayed_by(Duration::from_millis(80))
            .finish();
        mock.expect_command("work").finish();
        let config = config_of(vec![
            ("a", custom_only(&["work", "slow"])),
            ("b", custom_only(&["work", "fast"])),
        ]);

        let results = pipeline(&mock)
            .run(&root(), &config, &options(true, 0))
            .await
            .unwrap();

        let names: Vec<_> = results.iter().map(|r| r.subflake.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_step_failure_is_not_a_run_error() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("nix").finish();
        mock.expect_command("fail").returns_exit_code(1).finish();

        let mut broken = SubflakeConfig::default();
        broken.steps.build.enable = false;
        broken
            .steps
            .custom
            .insert("broken".to_string(), CustomStep::devshell(["fail"]));
        let config = config_of(vec![
            (".", SubflakeConfig::default()),
            ("broken", broken),
            ("tests", SubflakeConfig::default()),
        ]);

        let results = pipeline(&mock)
            .run(&root(), &config, &options(true, 2))
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        let failed: Vec<_> = results.iter().filter(|r| !r.success).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].subflake, "broken");
        assert!(!failed[0].steps.contains_key("build"));
        assert!(!failed[0].steps["custom:broken"].success);
    }

    #[tokio::test]
    async fn test_structural_error_aborts_run() {
        let (mock, mut config) = slow_work(2);
        config.default.insert(
            "bad".to_string(),
            SubflakeConfig {
                dir: "/absolute".to_string(),
                ..custom_only(&["work"])
            },
        );

        for opts in [options(false, 0), options(true, 0), options(true, 1)] {
            let err = pipeline(&mock)
                .run(&root(), &config, &opts)
                .await
                .unwrap_err();
            assert!(matches!(err, CiError::SubflakeUrl { ref subflake, .. } if subflake == "bad"));
        }
    }

    #[tokio::test]
    async fn test_empty_remote_host_is_rejected() {
        let mock = MockProcessRunner::new();
        let opts = RunOptions {
            remote_host: Some(String::new()),
            ..options(false, 0)
        };

        let err = pipeline(&mock)
            .run(&root(), &CiConfig::default(), &opts)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("not specified"));
        assert!(mock.get_call_history().is_empty());
    }

    #[tokio::test]
    async fn test_remote_host_routes_through_ssh() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("ssh").finish();
        let opts = RunOptions {
            remote_host: Some("builder".to_string()),
            ..options(false, 0)
        };

        let results = pipeline(&mock)
            .run(&root(), &CiConfig::default(), &opts)
            .await
            .unwrap();

        assert!(results[0].success);
        assert!(mock.verify_called("ssh", 3));
        assert!(mock.verify_called("nix", 0));
    }

    #[tokio::test]
    async fn test_cancellation_stops_run_promptly() {
        let mut mock = MockProcessRunner::new();
        mock.expect_command("work")
            .delayed_by(Duration::from_secs(30))
            .finish();
        let config = config_of(vec![
            ("a", custom_only(&["work"])),
            ("b", custom_only(&["work"])),
            ("c", custom_only(&["work"])),
        ]);
        let pipeline = pipeline(&mock);
        let token = pipeline.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let started = Instant::now();
        let err = pipeline
            .run(&root(), &config, &options(true, 1))
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_already_cancelled_runs_nothing() {
        let (mock, config) = slow_work(2);
        let token = CancellationToken::new();
        token.cancel();

        let err = pipeline(&mock)
            .with_cancellation(token)
            .run(&root(), &config, &options(false, 0))
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(mock.get_call_history().is_empty());
    }
}
