//! Structural errors of a CI run.
//!
//! These mean a subflake (or the whole run) could not be attempted. A step
//! that ran and failed is never an error here; it is recorded as data in
//! [`crate::ci::StepOutcome`].

use thiserror::Error;

use crate::flake::FlakeUrlError;

#[derive(Debug, Error)]
pub enum CiError {
    #[error("failed to resolve URL of subflake '{subflake}': {source}")]
    SubflakeUrl {
        subflake: String,
        #[source]
        source: FlakeUrlError,
    },

    #[error("remote host not specified")]
    RemoteHostNotSpecified,

    #[error("CI run cancelled")]
    Cancelled,
}

impl CiError {
    /// Whether the run was stopped from outside rather than failing on its own.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CiError::Cancelled)
    }
}
