use anyhow::{Context, Result};
use std::path::Path;
use tracing::{error, info};

use super::executor::SubflakeResult;
use super::github::LogGroup;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
}

impl Summary {
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed
    }
}

pub fn summarize(results: &[SubflakeResult]) -> Summary {
    let failed = results.iter().filter(|r| !r.success).count();
    Summary {
        passed: results.len() - failed,
        failed,
    }
}

/// Log one subflake result and each of its steps.
pub fn log_result(result: &SubflakeResult) {
    info!(
        subflake = %result.subflake,
        success = result.success,
        duration = ?result.duration,
        "CI result"
    );
    for (name, step) in &result.steps {
        info!(
            step = %name,
            success = step.success,
            duration = ?step.duration,
            "  step"
        );
        if !step.success {
            error!(step = %name, error = %step.error, "  step failed");
        }
    }
}

/// [`log_result`] for every result, each in its own log group when `github_output`.
pub fn log_results(results: &[SubflakeResult], github_output: bool) {
    for result in results {
        let _group = github_output
            .then(|| LogGroup::open(&format!("result: {}", result.subflake), std::io::stdout()));
        log_result(result);
    }
}

pub fn write_results(path: &Path, results: &[SubflakeResult]) -> Result<()> {
    let json = serde_json::to_string_pretty(results).context("Failed to serialize CI results")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write results to {}", path.display()))?;
    info!("Wrote CI results to {}", path.display());
    Ok(())
}
