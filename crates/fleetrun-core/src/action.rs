//! Kinds of action that produce a result

use std::fmt;

use serde::{Deserialize, Serialize};

/// The operation a [`TargetResult`](crate::TargetResult) describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Raw command line
    Command,
    /// Script file staged and executed on the target
    Script,
    /// Structured task reporting JSON on stdout
    Task,
    /// File transfer to the target
    Upload,
    /// Generic fallback, used for results built from errors or plugins
    #[default]
    Action,
}

impl Action {
    /// Wire name of the action
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Command => "command",
            Action::Script => "script",
            Action::Task => "task",
            Action::Upload => "upload",
            Action::Action => "action",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
