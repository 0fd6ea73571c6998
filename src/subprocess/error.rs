#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    /// A command ran to completion but reported failure. Carries the stderr
    /// text so callers can surface the tool's own diagnostics.
    #[error("command failed: {command} ({}): {stderr}", describe_exit(.exit_code))]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to spawn `{command}`: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("remote host not specified")]
    RemoteHostNotSpecified,

    #[error("invalid remote host '{0}'")]
    InvalidRemoteHost(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mock expectation not met: {0}")]
    MockExpectationNotMet(String),
}

impl ProcessError {
    /// Exit code reported by the failed process, if it exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ProcessError::CommandFailed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit {code}"),
        None => "terminated by signal".to_string(),
    }
}
