//! Flake references
//!
//! Resolution of flake URLs and their subflake directories.

pub mod url;

pub use url::{FlakeUrl, FlakeUrlError};
