//! CI configuration (`om.yaml`)
//!
//! ```yaml
//! ci:
//!   default:
//!     ROOT:
//!       dir: .
//!       systems: [x86_64-linux]
//!       steps:
//!         build: { impure: true }
//!         flakeCheck: { enable: false }
//!         custom:
//!           cargo-test:
//!             command: [just, test]
//! ```
//!
//! Subflakes and custom steps are keyed by name in ordered maps, so every
//! consumer sees them in lexicographic order.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

use super::step::Step;
use crate::flake::FlakeUrl;
use crate::subprocess::nix::NIX_PROGRAM;

fn default_true() -> bool {
    true
}

fn default_dir() -> String {
    ".".to_string()
}

/// `true` when `whitelist` is empty or shares a system with `systems`.
fn whitelist_allows(whitelist: &[String], systems: &[String]) -> bool {
    whitelist.is_empty() || systems.iter().any(|s| whitelist.contains(s))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CiConfig {
    /// Subflake configurations, keyed by subflake name.
    #[serde(default)]
    pub default: BTreeMap<String, SubflakeConfig>,
}

impl Default for CiConfig {
    /// The root flake with every built-in step enabled.
    fn default() -> Self {
        let mut default = BTreeMap::new();
        default.insert(".".to_string(), SubflakeConfig::default());
        Self { default }
    }
}

impl CiConfig {
    fn normalize(&mut self) {
        for subflake in self.default.values_mut() {
            if subflake.dir.trim().is_empty() {
                subflake.dir = default_dir();
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubflakeConfig {
    pub skip: bool,

    /// Directory of the subflake, relative to the flake root.
    pub dir: String,

    /// Optional whitelist of systems this subflake builds on.
    pub systems: Vec<String>,

    pub steps: StepsConfig,
}

impl Default for SubflakeConfig {
    fn default() -> Self {
        Self {
            skip: false,
            dir: default_dir(),
            systems: Vec::new(),
            steps: StepsConfig::default(),
        }
    }
}

impl SubflakeConfig {
    pub fn can_run_on(&self, systems: &[String]) -> bool {
        whitelist_allows(&self.systems, systems)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StepsConfig {
    pub build: BuildStep,

    pub lockfile: LockfileStep,

    #[serde(rename = "flakeCheck", alias = "flake-check", alias = "flake_check")]
    pub flake_check: FlakeCheckStep,

    pub custom: BTreeMap<String, CustomStep>,
}

impl StepsConfig {
    /// The steps to execute, in execution order: build, lockfile, flake
    /// check, then custom steps by name. Disabled steps, and custom steps
    /// whose whitelist excludes every requested system, are left out.
    pub fn steps_for(&self, systems: &[String]) -> Vec<Step> {
        let mut steps = Vec::new();

        if self.build.enable {
            steps.push(Step::Build {
                impure: self.build.impure,
            });
        }
        if self.lockfile.enable {
            steps.push(Step::Lockfile);
        }
        if self.flake_check.enable {
            steps.push(Step::FlakeCheck);
        }
        for (name, custom) in &self.custom {
            if !custom.enable {
                continue;
            }
            if !custom.can_run_on(systems) {
                debug!("Skipping custom step '{}': not enabled for {:?}", name, systems);
                continue;
            }
            steps.push(Step::Custom {
                name: name.clone(),
                step: custom.clone(),
            });
        }

        steps
    }

    /// Canonical names of every enabled step, regardless of system.
    pub fn enabled_step_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if self.build.enable {
            names.push("build".to_string());
        }
        if self.lockfile.enable {
            names.push("lockfile".to_string());
        }
        if self.flake_check.enable {
            names.push("flakeCheck".to_string());
        }
        names.extend(
            self.custom
                .iter()
                .filter(|(_, c)| c.enable)
                .map(|(name, _)| format!("custom:{name}")),
        );
        names
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildStep {
    pub enable: bool,
    /// Pass `--impure` to `nix build`.
    pub impure: bool,
}

impl Default for BuildStep {
    fn default() -> Self {
        Self {
            enable: true,
            impure: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockfileStep {
    #[serde(default = "default_true")]
    pub enable: bool,
}

impl Default for LockfileStep {
    fn default() -> Self {
        Self { enable: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlakeCheckStep {
    #[serde(default = "default_true")]
    pub enable: bool,
}

impl Default for FlakeCheckStep {
    fn default() -> Self {
        Self { enable: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CustomStepKind {
    /// `nix run <flake>#<app> -- <args>`
    #[serde(rename = "app")]
    App,
    /// A command run as given.
    #[default]
    #[serde(rename = "devshell", alias = "devShell")]
    DevShell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomStep {
    #[serde(rename = "type", default)]
    pub kind: CustomStepKind,

    /// App to run; defaults to the step's own name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Arguments passed to the app.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Command for devshell steps.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub systems: Vec<String>,

    #[serde(default = "default_true")]
    pub enable: bool,
}

impl CustomStep {
    pub fn devshell<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: CustomStepKind::DevShell,
            name: None,
            args: Vec::new(),
            command: command.into_iter().map(Into::into).collect(),
            systems: Vec::new(),
            enable: true,
        }
    }

    pub fn app(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            kind: CustomStepKind::App,
            name: Some(name.into()),
            args,
            command: Vec::new(),
            systems: Vec::new(),
            enable: true,
        }
    }

    pub fn can_run_on(&self, systems: &[String]) -> bool {
        whitelist_allows(&self.systems, systems)
    }

    /// The argument vector this step executes against `flake`.
    ///
    /// App steps always start with `nix`; devshell steps are their command
    /// verbatim, which may be empty.
    pub fn argument_vector(&self, step_name: &str, flake: &FlakeUrl) -> Vec<String> {
        match self.kind {
            CustomStepKind::App => {
                let app = self.name.as_deref().unwrap_or(step_name);
                let mut argv = vec![
                    NIX_PROGRAM.to_string(),
                    "run".to_string(),
                    flake.with_attr(app).to_string(),
                ];
                if !self.args.is_empty() {
                    argv.push("--".to_string());
                    argv.extend(self.args.iter().cloned());
                }
                argv
            }
            CustomStepKind::DevShell => self.command.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    ci: Option<CiConfig>,
}

/// Parse the `ci` section of an `om.yaml` document.
pub fn parse_config(yaml: &str) -> Result<CiConfig> {
    let file: ConfigFile = serde_yaml::from_str(yaml).context("Failed to parse config YAML")?;
    let mut config = file.ci.unwrap_or_default();
    config.normalize();
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<CiConfig> {
    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    parse_config(&yaml).with_context(|| format!("Invalid config in {}", path.display()))
}

/// Load `path` if it exists, otherwise fall back to [`CiConfig::default`].
pub fn load_config_or_default(path: &Path) -> Result<CiConfig> {
    if path.exists() {
        load_config(path)
    } else {
        warn!(
            "No config at {}, building the root flake with default steps",
            path.display()
        );
        Ok(CiConfig::default())
    }
}
