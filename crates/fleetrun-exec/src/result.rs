//! Request and raw output types exchanged with transports

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw output of one execution attempt, before interpretation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    /// Exit status code; `-1` when the process reported none
    pub exit_code: i32,
    /// stdout bytes, undecoded
    pub stdout: Vec<u8>,
    /// stderr bytes, undecoded
    pub stderr: Vec<u8>,
    /// Time taken to execute
    pub duration: Duration,
}

impl RawOutput {
    /// Check if the process exited with 0
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    #[must_use]
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// A command line to run through the transport's shell
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandRequest {
    /// Command line, interpreted by the selected shell
    pub command: String,
    /// Extra environment variables
    pub env: BTreeMap<String, String>,
    /// Bytes written to stdin, which is closed afterwards
    pub stdin: Option<Vec<u8>>,
    /// Working directory
    pub cwd: Option<PathBuf>,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

/// A local script to stage on the target and run with arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRequest {
    pub path: PathBuf,
    pub args: Vec<String>,
}

impl ScriptRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// How task parameters reach the task executable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMethod {
    /// JSON document on stdin
    Stdin,
    /// `PT_<name>` environment variables
    Environment,
    /// Both of the above
    #[default]
    Both,
}

impl InputMethod {
    #[must_use]
    pub fn uses_stdin(self) -> bool {
        matches!(self, InputMethod::Stdin | InputMethod::Both)
    }

    #[must_use]
    pub fn uses_environment(self) -> bool {
        matches!(self, InputMethod::Environment | InputMethod::Both)
    }
}

/// A task executable plus its parameters
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    /// Task name, used as the result object
    pub name: String,
    /// Local path of the executable to stage
    pub executable: PathBuf,
    pub params: Map<String, Value>,
    pub input_method: InputMethod,
}

impl TaskRequest {
    pub fn new(name: impl Into<String>, executable: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
            params: Map::new(),
            input_method: InputMethod::default(),
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn with_input_method(mut self, input_method: InputMethod) -> Self {
        self.input_method = input_method;
        self
    }

    /// JSON document sent on stdin: the parameters plus `_task`
    #[must_use]
    pub fn stdin_document(&self) -> Value {
        let mut doc = self.params.clone();
        doc.insert("_task".to_string(), Value::String(self.name.clone()));
        Value::Object(doc)
    }

    /// `PT_`-prefixed environment; strings are passed raw, everything else as JSON
    #[must_use]
    pub fn environment(&self) -> BTreeMap<String, String> {
        self.params
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (format!("PT_{k}"), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task() -> TaskRequest {
        let params = json!({ "name": "nginx", "count": 3, "opts": { "force": true } });
        TaskRequest::new("service::restart", "/tasks/restart.sh")
            .with_params(params.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn test_task_environment() {
        let env = task().environment();

        assert_eq!(env["PT_name"], "nginx");
        assert_eq!(env["PT_count"], "3");
        assert_eq!(env["PT_opts"], r#"{"force":true}"#);
    }

    #[test]
    fn test_task_stdin_document() {
        let doc = task().stdin_document();

        assert_eq!(doc["_task"], "service::restart");
        assert_eq!(doc["count"], 3);
    }

    #[test]
    fn test_input_method() {
        assert!(InputMethod::Both.uses_stdin() && InputMethod::Both.uses_environment());
        assert!(!InputMethod::Environment.uses_stdin());
        assert!(!InputMethod::Stdin.uses_environment());
    }

    #[test]
    fn test_raw_output_lossy() {
        let output = RawOutput {
            exit_code: 0,
            stdout: b"ok\xff".to_vec(),
            stderr: Vec::new(),
            duration: Duration::ZERO,
        };

        assert!(output.success());
        assert_eq!(output.stdout_lossy(), "ok\u{fffd}");
    }
}
