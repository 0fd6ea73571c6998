use async_trait::async_trait;
use std::sync::Arc;

use super::builder::ProcessCommandBuilder;
use super::error::ProcessError;
use super::runner::{ProcessOutput, ProcessRunner};

pub const SSH_PROGRAM: &str = "ssh";

/// Exit status ssh itself uses when the connection or authentication fails.
pub const SSH_TRANSPORT_FAILURE: i32 = 255;

/// Executes an argument vector on another machine.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn exec(&self, host: &str, command: &[String]) -> Result<ProcessOutput, ProcessError>;
}

/// Quote each argument for a POSIX shell and join them into one command
/// string, so the remote shell splits it back into the same words.
pub fn quote_command(command: &[String]) -> String {
    shell_words::join(command)
}

/// Reject hosts that would be parsed as ssh options or are empty.
pub fn validate_host(host: &str) -> Result<(), ProcessError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(ProcessError::RemoteHostNotSpecified);
    }
    if host.starts_with('-') || host.contains(char::is_whitespace) {
        return Err(ProcessError::InvalidRemoteHost(host.to_string()));
    }
    Ok(())
}

/// `ssh <host> <quoted command>` over the local process runner.
pub struct SshRunner {
    runner: Arc<dyn ProcessRunner>,
}

impl SshRunner {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl RemoteShell for SshRunner {
    async fn exec(&self, host: &str, command: &[String]) -> Result<ProcessOutput, ProcessError> {
        validate_host(host)?;

        let remote_command = quote_command(command);
        tracing::debug!("Remote command on {}: {}", host, remote_command);

        self.runner
            .run(
                ProcessCommandBuilder::new(SSH_PROGRAM)
                    .arg(host.trim())
                    .arg(&remote_command)
                    .build(),
            )
            .await
    }
}
