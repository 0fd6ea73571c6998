use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::config::CustomStep;

/// A single verification action, resolved from [`super::config::StepsConfig`].
///
/// Disabled steps never become a `Step`.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Build { impure: bool },
    Lockfile,
    FlakeCheck,
    Custom { name: String, step: CustomStep },
}

impl Step {
    /// Key of this step's outcome in [`super::SubflakeResult::steps`].
    pub fn key(&self) -> String {
        match self {
            Step::Build { .. } => "build".to_string(),
            Step::Lockfile => "lockfile".to_string(),
            Step::FlakeCheck => "flakeCheck".to_string(),
            Step::Custom { name, .. } => format!("custom:{name}"),
        }
    }
}

/// What happened when a step ran. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl StepOutcome {
    pub fn passed(name: impl Into<String>, output: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            success: true,
            error: String::new(),
            output: output.into(),
            duration,
        }
    }

    pub fn failed(name: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            success: false,
            error: error.into(),
            output: String::new(),
            duration,
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }
}
