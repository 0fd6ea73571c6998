//! `flakeci ci` command implementation

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::app::AppConfig;
use crate::ci::{self, generate_matrix, load_config_or_default, Pipeline, RunOptions};
use crate::cli::args::CiCommands;
use crate::flake::FlakeUrl;
use crate::subprocess::{NixRunner, SubprocessManager};

pub const CONFIG_FILE: &str = "om.yaml";

/// System used for `gh-matrix` when none is given.
pub const DEFAULT_MATRIX_SYSTEM: &str = "x86_64-linux";

pub async fn run_ci_command(command: CiCommands, app: &AppConfig) -> Result<()> {
    match command {
        CiCommands::Run {
            flake,
            systems,
            parallel,
            max_concurrency,
            remote,
            github_output,
            config,
            out_link,
            no_link,
        } => {
            run_ci(
                CiRunParams {
                    flake,
                    systems,
                    parallel,
                    max_concurrency,
                    remote,
                    github_output: github_output || app.github_actions,
                    config,
                    out_link: (!no_link).then_some(out_link),
                },
                app,
            )
            .await
        }
        CiCommands::GhMatrix {
            flake,
            systems,
            config,
        } => run_gh_matrix(flake, systems, config, app).await,
    }
}

pub struct CiRunParams {
    pub flake: String,
    pub systems: Vec<String>,
    pub parallel: bool,
    pub max_concurrency: usize,
    pub remote: Option<String>,
    pub github_output: bool,
    pub config: Option<PathBuf>,
    /// Results file; `None` when disabled.
    pub out_link: Option<PathBuf>,
}

/// The config file for `flake`: the explicit path, otherwise `om.yaml` in
/// the flake's directory (local flakes) or the working directory.
pub fn resolve_config_path(flake: &FlakeUrl, explicit: Option<PathBuf>, working_dir: &Path) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    let base = flake
        .as_local_path()
        .map(|p| working_dir.join(p))
        .unwrap_or_else(|| working_dir.to_path_buf());
    base.join(CONFIG_FILE)
}

fn clean_systems(systems: Vec<String>) -> Vec<String> {
    systems
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Systems for a matrix: the given ones, otherwise [`DEFAULT_MATRIX_SYSTEM`].
pub fn matrix_systems(systems: Vec<String>) -> Vec<String> {
    let systems = clean_systems(systems);
    if systems.is_empty() {
        vec![DEFAULT_MATRIX_SYSTEM.to_string()]
    } else {
        systems
    }
}

async fn resolve_systems(manager: &SubprocessManager, systems: Vec<String>) -> Result<Vec<String>> {
    let systems = clean_systems(systems);
    if !systems.is_empty() {
        return Ok(systems);
    }
    let current = manager
        .nix()
        .current_system()
        .await
        .context("Failed to determine the current system; pass --systems")?;
    info!("Using current system {}", current);
    Ok(vec![current])
}

pub fn build_run_options(params: &CiRunParams, systems: Vec<String>) -> RunOptions {
    if params.max_concurrency > 0 && !params.parallel {
        warn!("--max-concurrency has no effect without --parallel");
    }
    RunOptions {
        systems,
        parallel: params.parallel,
        max_concurrency: params.max_concurrency,
        remote_host: params.remote.clone(),
        github_output: params.github_output,
    }
}

async fn run_ci(params: CiRunParams, app: &AppConfig) -> Result<()> {
    let flake = FlakeUrl::parse(&params.flake).context("Invalid flake URL")?;
    let config_path = resolve_config_path(&flake, params.config.clone(), &app.working_dir);
    let config = load_config_or_default(&config_path)?;

    let manager = SubprocessManager::production();
    let systems = resolve_systems(&manager, params.systems.clone()).await?;
    let options = build_run_options(&params, systems);

    let pipeline = Pipeline::new(manager);
    let cancel = pipeline.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling CI run");
            cancel.cancel();
        }
    });

    let outcome = pipeline.run(&flake, &config, &options).await;
    interrupt.abort();
    let results = outcome.context("CI run failed")?;

    ci::report::log_results(&results, options.github_output);
    if let Some(path) = &params.out_link {
        ci::report::write_results(path, &results)?;
    }

    let summary = ci::report::summarize(&results);
    info!(
        "{} of {} subflake(s) passed",
        summary.passed,
        summary.total()
    );
    if !summary.success() {
        bail!("{} subflake(s) failed", summary.failed);
    }
    Ok(())
}

async fn run_gh_matrix(
    flake: String,
    systems: Vec<String>,
    config: Option<PathBuf>,
    app: &AppConfig,
) -> Result<()> {
    let flake = FlakeUrl::parse(&flake).context("Invalid flake URL")?;
    let config = load_config_or_default(&resolve_config_path(&flake, config, &app.working_dir))?;
    let systems = matrix_systems(systems);

    let matrix = generate_matrix(&systems, &config);
    info!("Generated matrix with {} row(s)", matrix.count());
    println!("{}", matrix.to_json()?);
    Ok(())
}
