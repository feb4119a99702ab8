//! Normalized outcome of one action against one target
//!
//! A [`TargetResult`] is built once by the factory matching the action that
//! produced it and never changes afterwards. Success or failure is not stored
//! separately: a result failed exactly when its value holds an `_error` entry.

use serde::{Serialize, Serializer};
use serde_json::Map;
use tracing::debug;

use crate::action::Action;
use crate::error::CoreError;
use crate::issue::{ErrorRecord, IssueKind, Reportable};
use crate::status::{Status, StatusHash};
use crate::target::Target;

/// Ordered, string-keyed payload of a result
pub type Value = Map<String, serde_json::Value>;

/// Reserved key holding the error record of a failed result
pub const ERROR_KEY: &str = "_error";

/// Reserved key holding a human-readable message
pub const OUTPUT_KEY: &str = "_output";

const INVALID_UTF8_MSG: &str = "The task result contained invalid UTF-8 on stdout";

/// Result of running an action against a target
#[derive(Debug, Clone)]
pub struct TargetResult {
    target: Target,
    action: Action,
    object: Option<String>,
    value: Value,
}

impl TargetResult {
    fn new(target: Target, action: Action, object: Option<String>, value: Value) -> Self {
        Self {
            target,
            action,
            object,
            value,
        }
    }

    /// Build a failed result from an error raised before any exit code existed
    ///
    /// Errors that carry their own structured record keep it verbatim.
    pub fn from_error<E>(target: Target, error: &E, action: Action) -> Self
    where
        E: Reportable + ?Sized,
    {
        let record = error
            .to_record()
            .unwrap_or_else(|| ErrorRecord::from_exception(error));

        debug!(
            target_name = %target.name,
            action = %action,
            issue_code = %record.issue_code,
            "result built from error"
        );

        let mut value = Value::new();
        value.insert(ERROR_KEY.to_string(), record.into_value());
        Self::new(target, action, None, value)
    }

    /// Interpret the output of a raw command
    ///
    /// Exit code 0 is the only success criterion; stderr never affects status.
    pub fn for_command(
        target: Target,
        stdout: impl AsRef<[u8]>,
        stderr: impl AsRef<[u8]>,
        exit_code: i32,
        command: impl Into<String>,
    ) -> Self {
        Self::for_process(target, Action::Command, stdout, stderr, exit_code, command)
    }

    /// Interpret the output of a staged script, with the same rule as commands
    pub fn for_script(
        target: Target,
        stdout: impl AsRef<[u8]>,
        stderr: impl AsRef<[u8]>,
        exit_code: i32,
        script: impl Into<String>,
    ) -> Self {
        Self::for_process(target, Action::Script, stdout, stderr, exit_code, script)
    }

    fn for_process(
        target: Target,
        action: Action,
        stdout: impl AsRef<[u8]>,
        stderr: impl AsRef<[u8]>,
        exit_code: i32,
        object: impl Into<String>,
    ) -> Self {
        let mut value = Value::new();
        value.insert(
            "stdout".to_string(),
            String::from_utf8_lossy(stdout.as_ref()).into_owned().into(),
        );
        value.insert(
            "stderr".to_string(),
            String::from_utf8_lossy(stderr.as_ref()).into_owned().into(),
        );
        value.insert("exit_code".to_string(), exit_code.into());

        if exit_code != 0 {
            let record = ErrorRecord::new(
                IssueKind::CommandFailure,
                format!("The {action} failed with exit code {exit_code}"),
            )
            .with_detail("exit_code", exit_code);
            value.insert(ERROR_KEY.to_string(), record.into_value());
        }

        Self::new(target, action, Some(object.into()), value)
    }

    /// Interpret the output of a task
    ///
    /// A JSON object on stdout becomes the value as-is, including any
    /// `_error` the task reported itself. Anything else is kept as `_output`.
    /// A non-zero exit adds an error only when the task did not report one.
    pub fn for_task(
        target: Target,
        stdout: impl AsRef<[u8]>,
        stderr: impl AsRef<[u8]>,
        exit_code: i32,
        task: impl Into<String>,
    ) -> Self {
        let task = task.into();

        let Ok(stdout) = std::str::from_utf8(stdout.as_ref()) else {
            let mut value = Value::new();
            value.insert(
                ERROR_KEY.to_string(),
                ErrorRecord::new(IssueKind::TaskFailure, INVALID_UTF8_MSG).into_value(),
            );
            return Self::new(target, Action::Task, Some(task), value);
        };

        let mut value = parse_object(stdout).unwrap_or_else(|| {
            let mut value = Value::new();
            value.insert(OUTPUT_KEY.to_string(), stdout.into());
            value
        });

        normalize_task_error(&mut value, &task);

        if exit_code != 0 && !value.contains_key(ERROR_KEY) {
            let stderr = String::from_utf8_lossy(stderr.as_ref());
            let msg = match (stdout.is_empty(), stderr.is_empty()) {
                (true, true) => {
                    format!("The task failed with exit code {exit_code} and no output")
                }
                (true, false) => format!(
                    "The task failed with exit code {exit_code} and no stdout, but stderr contained:\n{stderr}"
                ),
                (false, _) => format!("The task failed with exit code {exit_code}"),
            };
            let record =
                ErrorRecord::new(IssueKind::TaskFailure, msg).with_detail("exit_code", exit_code);
            value.insert(ERROR_KEY.to_string(), record.into_value());
        }

        Self::new(target, Action::Task, Some(task), value)
    }

    /// Confirmation of a completed upload
    ///
    /// Copy failures never reach this constructor; they surface through
    /// [`TargetResult::from_error`].
    pub fn for_upload(target: Target, source: &str, destination: &str) -> Self {
        let mut value = Value::new();
        value.insert(
            OUTPUT_KEY.to_string(),
            format!("Uploaded '{source}' to '{}:{destination}'", target.host()).into(),
        );
        Self::new(target, Action::Upload, Some(source.to_string()), value)
    }

    /// Wrap a value assembled elsewhere, e.g. by a plugin
    ///
    /// `null` becomes an empty mapping and any other non-object is stored
    /// under `value`.
    ///
    /// # Errors
    /// Returns `CoreError::MalformedError` if `_error` is present but not an object
    pub fn from_asserted_args(
        target: Target,
        action: Action,
        object: Option<String>,
        value: serde_json::Value,
    ) -> Result<Self, CoreError> {
        let value = match value {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => Value::new(),
            other => {
                let mut map = Value::new();
                map.insert("value".to_string(), other);
                map
            }
        };

        if let Some(error) = value.get(ERROR_KEY)
            && !error.is_object()
        {
            return Err(CoreError::MalformedError(error.to_string()));
        }

        Ok(Self::new(target, action, object, value))
    }

    #[must_use]
    pub fn target(&self) -> &Target {
        &self.target
    }

    #[must_use]
    pub fn action(&self) -> Action {
        self.action
    }

    #[must_use]
    pub fn object(&self) -> Option<&str> {
        self.object.as_deref()
    }

    /// Full payload including reserved keys
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// True when no `_error` is present
    #[must_use]
    pub fn is_ok(&self) -> bool {
        !self.value.contains_key(ERROR_KEY)
    }

    #[must_use]
    pub fn status(&self) -> Status {
        if self.is_ok() {
            Status::Success
        } else {
            Status::Failure
        }
    }

    /// Raw `_error` entry
    #[must_use]
    pub fn error_value(&self) -> Option<&serde_json::Value> {
        self.value.get(ERROR_KEY)
    }

    /// `_error` entry as a record; fields a task omitted are empty
    #[must_use]
    pub fn error(&self) -> Option<ErrorRecord> {
        self.error_value()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Human-readable `_output`, if any
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.value.get(OUTPUT_KEY).and_then(serde_json::Value::as_str)
    }

    /// True when `_output` has non-whitespace content
    #[must_use]
    pub fn has_message(&self) -> bool {
        self.message().is_some_and(|m| !m.trim().is_empty())
    }

    /// Payload without the reserved `_error` and `_output` keys
    #[must_use]
    pub fn generic_value(&self) -> Value {
        self.value
            .iter()
            .filter(|(k, _)| k.as_str() != ERROR_KEY && k.as_str() != OUTPUT_KEY)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Canonical serializable projection
    #[must_use]
    pub fn status_hash(&self) -> StatusHash {
        StatusHash {
            target: self.target.name.clone(),
            action: self.action,
            object: self.object.clone(),
            status: self.status(),
            value: self.value.clone(),
        }
    }

    /// Serialize the status hash to JSON
    ///
    /// # Errors
    /// Returns `CoreError::Serialization` if encoding fails
    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string(&self.status_hash())?)
    }
}

/// Structural equality over target and value; action and object are ignored
impl PartialEq for TargetResult {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target && self.value == other.value
    }
}

impl Serialize for TargetResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.status_hash().serialize(serializer)
    }
}

/// Parse stdout as a JSON object; arrays and scalars do not count
fn parse_object(stdout: &str) -> Option<Value> {
    match serde_json::from_str(stdout) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Replace a self-reported `_error` that is not an object with a `msg` string
fn normalize_task_error(value: &mut Value, task: &str) {
    let Some(error) = value.get(ERROR_KEY) else {
        return;
    };
    if error.get("msg").is_some_and(serde_json::Value::is_string) {
        return;
    }

    let record = ErrorRecord::new(
        IssueKind::TaskFailure,
        format!(
            "Invalid error returned from task {task}: {error}. Error must be an object with a msg key."
        ),
    )
    .with_detail("original_error", error.clone());
    value.insert(ERROR_KEY.to_string(), record.into_value());
}
