//! GitHub Actions build matrix
//!
//! One row per `(system, subflake)` pair that CI would build, so a workflow
//! can fan the work out over a job matrix.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::config::CiConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixRow {
    pub system: String,
    pub subflake: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GitHubMatrix {
    pub include: Vec<MatrixRow>,
}

impl GitHubMatrix {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize matrix to JSON")
    }

    pub fn count(&self) -> usize {
        self.include.len()
    }
}

/// Rows are ordered by system (as given), then by subflake name.
pub fn generate_matrix(systems: &[String], config: &CiConfig) -> GitHubMatrix {
    let include = systems
        .iter()
        .flat_map(|system| {
            let only = std::slice::from_ref(system);
            config
                .default
                .iter()
                .filter(move |(_, subflake)| !subflake.skip && subflake.can_run_on(only))
                .map(move |(name, _)| MatrixRow {
                    system: system.clone(),
                    subflake: name.clone(),
                })
        })
        .collect();

    GitHubMatrix { include }
}
