//! Common test utilities and helpers

#![allow(dead_code)]

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A throwaway flake directory with an `om.yaml` and sub-directories.
pub struct FlakeFixture {
    temp_dir: TempDir,
}

impl FlakeFixture {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
        })
    }

    /// Write `om.yaml` at the flake root
    pub fn with_config(self, yaml: &str) -> Result<Self> {
        fs::write(self.temp_dir.path().join("om.yaml"), yaml)?;
        Ok(self)
    }

    /// Create a sub-directory for a subflake
    pub fn with_dir(self, dir: impl AsRef<Path>) -> Result<Self> {
        fs::create_dir_all(self.temp_dir.path().join(dir))?;
        Ok(self)
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.path().join("om.yaml")
    }

    /// The flake URL of this directory
    pub fn url(&self) -> String {
        self.path().display().to_string()
    }
}

/// `om.yaml` with built-in steps disabled and one custom command per
/// subflake. Commands are YAML flow sequences, e.g. `[sh, -c, "exit 1"]`.
pub fn custom_command_config(subflakes: &[(&str, &str, &str)]) -> String {
    let mut yaml = String::from("ci:\n  default:\n");
    for (name, dir, command) in subflakes {
        yaml.push_str(&format!(
            "    {name:?}:\n      dir: {dir:?}\n      steps:\n        build: {{ enable: false }}\n        lockfile: {{ enable: false }}\n        flakeCheck: {{ enable: false }}\n        custom:\n          work:\n            command: {command}\n"
        ));
    }
    yaml
}
