//! Fatal error handling

use tracing::error;

use crate::ci::CiError;

/// Exit status for a failed command line or configuration.
pub const ARGUMENT_ERROR: i32 = 2;
pub const GENERAL_ERROR: i32 = 1;

/// Exit code for an error that stopped a command.
///
/// Configuration and argument problems get [`ARGUMENT_ERROR`]; everything
/// else, including infrastructure failures during a run, gets
/// [`GENERAL_ERROR`].
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    for cause in error.chain() {
        if let Some(ci_err) = cause.downcast_ref::<CiError>() {
            return match ci_err {
                CiError::SubflakeUrl { .. } | CiError::RemoteHostNotSpecified => ARGUMENT_ERROR,
                CiError::Cancelled => GENERAL_ERROR,
            };
        }
        if cause.downcast_ref::<serde_yaml::Error>().is_some()
            || cause.downcast_ref::<crate::flake::FlakeUrlError>().is_some()
        {
            return ARGUMENT_ERROR;
        }
    }
    GENERAL_ERROR
}

/// Report `error` on stderr and exit. With `verbose >= 1` the whole error
/// chain is printed.
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {:#}", error);

    eprintln!("Error: {error:#}");
    if verbose >= 1 {
        eprintln!("\nError chain:");
        for (i, cause) in error.chain().enumerate() {
            eprintln!("  {}: {}", i, cause);
        }
    }

    std::process::exit(exit_code_for(&error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_config_errors_are_argument_errors() {
        let yaml_err = serde_yaml::from_str::<serde_yaml::Value>("a: [").unwrap_err();
        let err = anyhow::Error::new(yaml_err).context("Invalid config in om.yaml");
        assert_eq!(exit_code_for(&err), ARGUMENT_ERROR);

        let err: anyhow::Error = CiError::RemoteHostNotSpecified.into();
        assert_eq!(exit_code_for(&err), ARGUMENT_ERROR);
    }

    #[test]
    fn test_other_errors_are_general() {
        let err: anyhow::Error = CiError::Cancelled.into();
        assert_eq!(exit_code_for(&err), GENERAL_ERROR);

        let io: Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        let err = io.context("Failed to write results").unwrap_err();
        assert_eq!(exit_code_for(&err), GENERAL_ERROR);
    }
}
