//! Bounded execution of argv vectors.

use std::{process::Output, time::Duration};

use color_eyre::eyre;
use tokio::process::Command;
use tracing::debug;

use crate::error::ClientError;

/// Runs `argv` and returns its output, whatever the exit status.
///
/// The child is killed if it outlives `limit`.
pub async fn run(argv: &[String], limit: Duration) -> eyre::Result<Output> {
    let (program, args) = argv.split_first().ok_or(ClientError::EmptyCommand("exec"))?;
    let command = argv.join(" ");
    debug!(%command, "Running command");

    let child = Command::new(program).args(args).kill_on_drop(true).output();
    match tokio::time::timeout(limit, child).await {
        Ok(output) => Ok(output?),
        Err(_) => Err(ClientError::CommandTimeout { command, timeout: limit }.into()),
    }
}

/// Runs `argv` and fails unless it exits successfully.
pub async fn run_checked(argv: &[String], limit: Duration) -> eyre::Result<()> {
    let output = run(argv, limit).await?;
    if output.status.success() {
        return Ok(());
    }
    Err(ClientError::CommandFailed {
        command: argv.join(" "),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
    .into())
}

/// Prefixes `argv` with `exec` so it runs on the node's host.
pub fn on_host(exec: &[String], argv: impl IntoIterator<Item = String>) -> Vec<String> {
    exec.iter().cloned().chain(argv).collect()
}
