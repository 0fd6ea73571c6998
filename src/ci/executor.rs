use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::config::SubflakeConfig;
use super::error::CiError;
use super::runner::StepRunner;
use super::step::StepOutcome;
use crate::flake::FlakeUrl;

/// Outcome of every step run for one subflake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubflakeResult {
    pub subflake: String,
    pub steps: BTreeMap<String, StepOutcome>,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub success: bool,
}

impl SubflakeResult {
    pub fn failed_steps(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.values().filter(|s| !s.success)
    }
}

/// Run every enabled step of `subflake` against `flake`.
///
/// Steps run in order and a failing step does not stop the ones after it.
/// The only error is failing to resolve the subflake's URL, in which case
/// nothing runs.
pub async fn run_subflake(
    runner: &dyn StepRunner,
    flake: &FlakeUrl,
    name: &str,
    subflake: &SubflakeConfig,
    systems: &[String],
) -> Result<SubflakeResult, CiError> {
    let started = Instant::now();

    let url = flake
        .sub_flake_url(&subflake.dir)
        .map_err(|source| CiError::SubflakeUrl {
            subflake: name.to_string(),
            source,
        })?;

    info!("Running CI for subflake '{}' ({})", name, url);

    let mut steps = BTreeMap::new();
    let mut success = true;
    for step in subflake.steps.steps_for(systems) {
        let outcome = runner.run_step(&url, &step).await;
        if outcome.success {
            debug!("Step {} of '{}' passed", outcome.name, name);
        } else {
            warn!("Step {} of '{}' failed: {}", outcome.name, name, outcome.error);
            success = false;
        }
        steps.insert(step.key(), outcome);
    }

    let duration = started.elapsed();
    info!(
        "Subflake '{}' {} in {:?}",
        name,
        if success { "passed" } else { "failed" },
        duration
    );

    Ok(SubflakeResult {
        subflake: name.to_string(),
        steps,
        duration,
        success,
    })
}
