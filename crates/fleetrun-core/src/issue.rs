//! Structured error records
//!
//! Every failing result carries an [`ErrorRecord`] under its `_error` key.
//! The record always has the same four fields on the wire, whichever
//! transport or action produced it, so consumers only ever match on
//! `issue_code`.

use std::any::type_name;
use std::error::Error as StdError;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Failure categories produced by the result model itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Transport or internal fault that never produced an exit code
    Exception,
    /// Non-zero exit from a command or script
    CommandFailure,
    /// Failed or malformed task
    TaskFailure,
}

impl IssueKind {
    /// Namespaced taxonomy string
    #[must_use]
    pub fn kind(self) -> &'static str {
        match self {
            IssueKind::Exception => "exception-error",
            IssueKind::CommandFailure => "command-error",
            IssueKind::TaskFailure => "task-error",
        }
    }

    /// Machine-matchable issue code
    #[must_use]
    pub fn issue_code(self) -> &'static str {
        match self {
            IssueKind::Exception => "EXCEPTION",
            IssueKind::CommandFailure => "COMMAND_ERROR",
            IssueKind::TaskFailure => "TASK_ERROR",
        }
    }

    /// Look up the kind for an issue code
    #[must_use]
    pub fn from_issue_code(code: &str) -> Option<Self> {
        match code {
            "EXCEPTION" => Some(IssueKind::Exception),
            "COMMAND_ERROR" => Some(IssueKind::CommandFailure),
            "TASK_ERROR" => Some(IssueKind::TaskFailure),
            _ => None,
        }
    }
}

/// Wire shape of `_error`: `{kind, issue_code, msg, details}`
///
/// Fields default to empty when read back from a task's self-reported error,
/// which only has to provide `msg`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorRecord {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub issue_code: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl ErrorRecord {
    /// Create a record for one of the built-in issue kinds
    pub fn new(issue: IssueKind, msg: impl Into<String>) -> Self {
        Self::custom(issue.kind(), issue.issue_code(), msg)
    }

    /// Create a record with an arbitrary kind and code
    ///
    /// Used by adapters whose faults have their own taxonomy (e.g. `COPY_ERROR`).
    pub fn custom(
        kind: impl Into<String>,
        issue_code: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            issue_code: issue_code.into(),
            msg: msg.into(),
            details: Map::new(),
        }
    }

    /// Add a detail entry
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Built-in issue kind, if the code is one of ours
    #[must_use]
    pub fn issue(&self) -> Option<IssueKind> {
        IssueKind::from_issue_code(&self.issue_code)
    }

    /// Convert into the JSON object stored under `_error`
    #[must_use]
    pub fn into_value(self) -> Value {
        let mut map = Map::new();
        map.insert("kind".to_string(), Value::String(self.kind));
        map.insert("issue_code".to_string(), Value::String(self.issue_code));
        map.insert("msg".to_string(), Value::String(self.msg));
        map.insert("details".to_string(), Value::Object(self.details));
        Value::Object(map)
    }

    /// Synthesize an `EXCEPTION` record from any error
    ///
    /// `details.class` holds the Rust type name and `details.stack_trace`
    /// the chain of `source()` causes, when there are any.
    pub fn from_exception<E>(error: &E) -> Self
    where
        E: StdError + ?Sized,
    {
        let mut record = Self::new(IssueKind::Exception, error.to_string())
            .with_detail("class", type_name::<E>());

        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        if !chain.is_empty() {
            record = record.with_detail("stack_trace", chain.join("\n"));
        }

        record
    }
}

/// Errors that can be turned into a result
///
/// Implementors that already carry a structured payload return it from
/// [`Reportable::to_record`], and it is reused verbatim. Everything else is
/// wrapped as an `EXCEPTION`.
pub trait Reportable: StdError {
    /// Structured payload, if this error has one
    fn to_record(&self) -> Option<ErrorRecord> {
        None
    }
}

impl Reportable for std::io::Error {}

impl Reportable for serde_json::Error {}
