//! Core error types for fleetrun-core

use thiserror::Error;

use crate::issue::Reportable;

/// Errors raised while assembling or serializing results
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// `_error` was supplied as something other than an object
    #[error("malformed _error entry: expected an object, got {0}")]
    MalformedError(String),

    /// Serialization of a result failed
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl Reportable for CoreError {}
