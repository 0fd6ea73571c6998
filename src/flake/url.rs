//! Flake URL handling
//!
//! A [`FlakeUrl`] is kept as the opaque string Nix accepts. The only
//! structure we interpret is what CI needs: whether the URL is a local path,
//! its `#attr` suffix, and how to point it at a sub-directory.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlakeUrlError {
    #[error("flake URL is empty")]
    Empty,

    #[error("subflake directory '{0}' must be relative to the flake root")]
    AbsoluteDir(String),

    #[error("subflake directory '{0}' escapes the flake root")]
    EscapesRoot(String),

    #[error("subflake directory '{0}' contains a reserved URL character")]
    ReservedCharacter(String),
}

/// A Nix flake URL, e.g. `.`, `./sub`, `github:owner/repo`, `path:/x#pkg`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlakeUrl(String);

impl FlakeUrl {
    pub fn parse(url: &str) -> Result<Self, FlakeUrlError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(FlakeUrlError::Empty);
        }
        Ok(Self(url.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Local filesystem path for path-like URLs, without query or attribute.
    pub fn as_local_path(&self) -> Option<&Path> {
        let s = self.0.strip_prefix("path:").unwrap_or(&self.0);
        if !s.starts_with('.') && !s.starts_with('/') {
            return None;
        }
        let end = s.find(['?', '#']).unwrap_or(s.len());
        Some(Path::new(&s[..end]))
    }

    /// Split into the base URL and the attribute (empty when absent).
    pub fn split_attr(&self) -> (&str, &str) {
        match self.0.split_once('#') {
            Some((base, attr)) => (base, attr),
            None => (&self.0, ""),
        }
    }

    pub fn with_attr(&self, attr: &str) -> FlakeUrl {
        let base = self.split_attr().0;
        if attr.is_empty() {
            FlakeUrl(base.to_string())
        } else {
            FlakeUrl(format!("{base}#{attr}"))
        }
    }

    /// Point this URL at the flake living in `dir` below its root.
    ///
    /// `"."` (or an empty dir) returns the URL unchanged. Local URLs get the
    /// directory joined onto their path; everything else gets a `dir=` query
    /// parameter. Scheme, query and attribute are kept either way.
    pub fn sub_flake_url(&self, dir: &str) -> Result<FlakeUrl, FlakeUrlError> {
        if dir.is_empty() || dir == "." {
            return Ok(self.clone());
        }
        validate_sub_dir(dir)?;

        let (base, attr) = self.split_attr();
        let mut url = match self.as_local_path() {
            Some(local) => {
                let scheme = if base.starts_with("path:") { "path:" } else { "" };
                let query = base.find('?').map_or("", |i| &base[i..]);
                format!("{scheme}{}{query}", normalize_join(local, dir))
            }
            None => {
                let separator = if base.contains('?') { '&' } else { '?' };
                format!("{base}{separator}dir={dir}")
            }
        };
        if !attr.is_empty() {
            url.push('#');
            url.push_str(attr);
        }
        Ok(FlakeUrl(url))
    }
}

fn validate_sub_dir(dir: &str) -> Result<(), FlakeUrlError> {
    if dir.contains(['#', '?', '&']) {
        return Err(FlakeUrlError::ReservedCharacter(dir.to_string()));
    }
    let path = Path::new(dir);
    if path.is_absolute() {
        return Err(FlakeUrlError::AbsoluteDir(dir.to_string()));
    }
    if path.components().any(|c| c == Component::ParentDir) {
        return Err(FlakeUrlError::EscapesRoot(dir.to_string()));
    }
    Ok(())
}

/// Join and keep the result path-like, so Nix reads it as a path flake
/// (`tests` alone would be looked up in the registry).
fn normalize_join(base: &Path, dir: &str) -> String {
    let mut joined = PathBuf::from(base);
    for component in Path::new(dir).components() {
        if let Component::Normal(part) = component {
            joined.push(part);
        }
    }
    let s = joined.to_string_lossy().to_string();
    if s.starts_with('.') || s.starts_with('/') {
        s
    } else {
        format!("./{s}")
    }
}

impl std::fmt::Display for FlakeUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for FlakeUrl {
    type Err = FlakeUrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FlakeUrl::parse(s)
    }
}
