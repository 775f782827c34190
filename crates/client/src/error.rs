#![allow(missing_docs)]

use std::time::Duration;

use thiserror::Error;

/// Error kinds raised by node handles.
///
/// Operations return `eyre::Result`; these variants let callers downcast and
/// match on the failure class when they need to.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON-RPC error (code {code}): {message}")]
    JsonRpc { code: i64, message: String },

    #[error("Invalid response to {method}: {reason}")]
    InvalidResponse { method: String, reason: String },

    #[error("No command configured for `{0}`")]
    EmptyCommand(&'static str),

    #[error("Command `{command}` exited with {status}: {stderr}")]
    CommandFailed { command: String, status: String, stderr: String },

    #[error("Command `{command}` did not finish within {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },

    #[error("Traffic from {host} is still accepted after installing the drop rule")]
    PartitionNotConfirmed { host: String },
}
