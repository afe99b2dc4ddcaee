use crate::process::{ProcessId, StdStream};
use std::io;
use thiserror::Error;

/// Result alias used by every spawner operation
pub type Result<T> = std::result::Result<T, SpawnError>;

/// Failures reported synchronously by a spawner.
///
/// A child that cannot exec its command is not an error here: it shows up as
/// an exit status when the child is reaped.
#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Failed to create pipe for child {stream}: {source}")]
    PipeCreation {
        stream: StdStream,
        #[source]
        source: io::Error,
    },

    #[error("Failed to create process for `{command}`: {source}")]
    ProcessCreation {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Cannot reap process {pid}: {reason}")]
    ReapMisuse { pid: ProcessId, reason: String },

    #[error("Failed to wait for process {pid}: {source}")]
    Wait {
        pid: ProcessId,
        #[source]
        source: io::Error,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl SpawnError {
    /// Check if this error is a transient resource shortage worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            SpawnError::PipeCreation { source, .. } | SpawnError::ProcessCreation { source, .. } => {
                matches!(
                    source.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::OutOfMemory | io::ErrorKind::Interrupted
                )
            }
            _ => false,
        }
    }

    /// Check if this error indicates a permanent failure
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            SpawnError::InvalidCommand(_)
                | SpawnError::Configuration(_)
                | SpawnError::ReapMisuse { .. }
        )
    }

    /// Pipe or process creation failed before a child existed
    pub fn is_spawn_failure(&self) -> bool {
        matches!(
            self,
            SpawnError::PipeCreation { .. } | SpawnError::ProcessCreation { .. }
        )
    }

    /// The caller asked for something that can never succeed
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            SpawnError::InvalidCommand(_) | SpawnError::ReapMisuse { .. }
        )
    }
}
