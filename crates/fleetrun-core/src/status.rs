//! Status and the canonical serialized projection of a result

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::action::Action;

/// Derived outcome of a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failure,
}

impl Status {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Failure => "failure",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire form of a result: exactly `target, action, object, status, value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusHash {
    /// Target name
    pub target: String,
    pub action: Action,
    /// Command, script path, task name or upload source
    pub object: Option<String>,
    pub status: Status,
    pub value: Map<String, Value>,
}
