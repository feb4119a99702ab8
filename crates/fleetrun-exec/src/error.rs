//! Error types for fleetrun-exec

use std::path::PathBuf;
use std::time::Duration;

use fleetrun_core::{ErrorRecord, Reportable};
use thiserror::Error;

/// Issue code carried by every file-transfer failure
pub const COPY_ERROR: &str = "COPY_ERROR";

const FILE_TRANSFER_KIND: &str = "file-transfer-error";

/// Adapter faults that prevented an exit code from being produced
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Failed to reach the target
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Execution exceeded the caller's deadline
    #[error("operation timed out after {timeout:?}")]
    Timeout {
        /// Timeout duration that was exceeded
        timeout: Duration,
    },

    /// Process spawn error
    #[error("failed to spawn process: {0}")]
    SpawnError(String),

    /// I/O error while talking to the process
    #[error("I/O error: {0}")]
    IoError(String),

    /// Copying a file or directory to the target failed
    #[error("could not copy to {}: {message}", .destination.display())]
    Copy {
        /// Destination path of the failed copy
        destination: PathBuf,
        /// Underlying failure
        message: String,
    },

    /// Staging a script or task on the target failed
    #[error("could not stage {}: {message}", .path.display())]
    Staging {
        /// Executable being staged
        path: PathBuf,
        /// Underlying failure
        message: String,
    },
}

impl ExecError {
    /// Build a copy error for a destination
    pub fn copy(destination: impl Into<PathBuf>, message: impl ToString) -> Self {
        ExecError::Copy {
            destination: destination.into(),
            message: message.to_string(),
        }
    }
}

impl Reportable for ExecError {
    fn to_record(&self) -> Option<ErrorRecord> {
        match self {
            ExecError::Copy { destination, .. } => Some(
                ErrorRecord::custom(FILE_TRANSFER_KIND, COPY_ERROR, self.to_string())
                    .with_detail("path", destination.display().to_string()),
            ),
            _ => None,
        }
    }
}
