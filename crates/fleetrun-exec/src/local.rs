//! Local command execution using `tokio::process`

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use fleetrun_core::Target;
use serde::{Deserialize, Serialize};
use tempfile::TempPath;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, instrument, warn};

use crate::error::ExecError;
use crate::result::{CommandRequest, RawOutput, ScriptRequest, TaskRequest};
use crate::shell::ShellKind;
use crate::staging::{StagingDir, replace_destination};
use crate::traits::{Capabilities, Transport};

/// Options for the local transport, already validated by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalOptions {
    /// Directory for staged scripts and wrappers (system temp dir if unset)
    #[serde(default)]
    pub tmpdir: Option<PathBuf>,
    /// Remove staged files after each run
    #[serde(default = "default_cleanup")]
    pub cleanup: bool,
    /// Interpreter per script extension, e.g. `rb = "/usr/bin/ruby"`
    #[serde(default)]
    pub interpreters: BTreeMap<String, String>,
    /// Environment added to every process
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    /// Override the platform shell
    #[serde(default)]
    pub shell: Option<ShellKind>,
}

fn default_cleanup() -> bool {
    true
}

impl Default for LocalOptions {
    fn default() -> Self {
        Self {
            tmpdir: None,
            cleanup: default_cleanup(),
            interpreters: BTreeMap::new(),
            env_vars: BTreeMap::new(),
            shell: None,
        }
    }
}

impl LocalOptions {
    /// Interpreter configured for a script's extension
    #[must_use]
    pub fn interpreter_for(&self, script: &Path) -> Option<&str> {
        let ext = script.extension()?.to_str()?;
        self.interpreters
            .iter()
            .find(|(key, _)| key.trim_start_matches('.') == ext)
            .map(|(_, interpreter)| interpreter.as_str())
    }
}

/// Transport running everything on this machine
///
/// The shell is resolved once at construction and kept for the transport's
/// lifetime.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    target: Target,
    options: LocalOptions,
    shell: ShellKind,
}

impl LocalTransport {
    /// Create a local transport for a target
    #[must_use]
    pub fn new(target: Target, options: LocalOptions) -> Self {
        let shell = options.shell.unwrap_or_else(ShellKind::detect);
        debug!(target_name = %target.name, shell = ?shell, "local transport ready");
        Self {
            target,
            options,
            shell,
        }
    }

    #[must_use]
    pub fn options(&self) -> &LocalOptions {
        &self.options
    }

    fn tmpdir(&self) -> PathBuf {
        self.options
            .tmpdir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Spawn a command without waiting for it
    ///
    /// The returned handle owns the child and its pipes. Any staged wrapper
    /// script lives as long as the handle, and is removed right away if the
    /// spawn fails.
    ///
    /// # Errors
    /// Returns `ExecError::Staging` if a wrapper cannot be written and
    /// `ExecError::SpawnError` if the process cannot be started
    pub fn spawn(&self, request: &CommandRequest) -> Result<ProcessHandle, ExecError> {
        let invocation = self.shell.wrap(&request.command, &self.tmpdir())?;

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .envs(&self.options.env_vars)
            .envs(&request.env)
            .stdin(if request.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| ExecError::SpawnError(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecError::IoError("stdout pipe unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExecError::IoError("stderr pipe unavailable".to_string()))?;
        let stdin = child.stdin.take().zip(request.stdin.clone());

        Ok(ProcessHandle {
            child,
            stdout,
            stderr,
            stdin,
            started: Instant::now(),
            _staged: invocation.staged,
        })
    }

    /// Command line running a staged executable, through its interpreter if one is set
    fn executable_command(&self, path: &Path, args: &[String]) -> String {
        let path_str = path.display().to_string();

        if let Some(interpreter) = self.options.interpreter_for(path) {
            let mut full = vec![path_str];
            full.extend_from_slice(args);
            return self.shell.command_line(interpreter, &full);
        }

        let is_ps1 = path.extension().is_some_and(|e| e == "ps1");
        if self.shell == ShellKind::PowerShell && !is_ps1 {
            warn!(path = %path.display(), "no interpreter configured, running directly");
        }
        self.shell.command_line(&path_str, args)
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn target(&self) -> &Target {
        &self.target
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            reset_cwd: true,
            supports_stdin: true,
            shell: self.shell,
        }
    }

    fn transport_type(&self) -> &'static str {
        "local"
    }

    #[instrument(skip(self, request), fields(target_name = %self.target.name), level = "debug")]
    async fn execute(&self, request: CommandRequest) -> Result<RawOutput, ExecError> {
        debug!(command = %request.command, "executing local command");

        let output = self.spawn(&request)?.collect().await?;

        debug!(
            command = %request.command,
            exit_code = output.exit_code,
            duration = ?output.duration,
            "command completed"
        );

        if !output.success() {
            warn!(
                command = %request.command,
                exit_code = output.exit_code,
                "command exited non-zero"
            );
        }

        Ok(output)
    }

    #[instrument(skip(self, request), fields(target_name = %self.target.name), level = "debug")]
    async fn run_script(&self, request: &ScriptRequest) -> Result<RawOutput, ExecError> {
        let staging = StagingDir::create(&self.tmpdir(), self.options.cleanup)?;
        let script = staging.stage(&request.path)?;
        let command = self.executable_command(&script, &request.args);

        self.execute(CommandRequest::new(command)).await
    }

    #[instrument(skip(self, request), fields(target_name = %self.target.name, task = %request.name), level = "debug")]
    async fn run_task(&self, request: &TaskRequest) -> Result<RawOutput, ExecError> {
        let staging = StagingDir::create(&self.tmpdir(), self.options.cleanup)?;
        let executable = staging.stage(&request.executable)?;

        let mut command = CommandRequest::new(self.executable_command(&executable, &[]));
        if request.input_method.uses_environment() {
            command.env.extend(request.environment());
        }
        if request.input_method.uses_stdin() {
            let document = serde_json::to_vec(&request.stdin_document())
                .map_err(|e| ExecError::IoError(e.to_string()))?;
            command = command.with_stdin(document);
        }

        self.execute(command).await
    }

    #[instrument(skip(self), fields(target_name = %self.target.name), level = "debug")]
    async fn copy_file(&self, source: &Path, destination: &Path) -> Result<(), ExecError> {
        let source = source.to_path_buf();
        let destination = destination.to_path_buf();
        let dest_for_join = destination.clone();

        tokio::task::spawn_blocking(move || replace_destination(&source, &destination))
            .await
            .map_err(|e| ExecError::copy(dest_for_join, e))?
    }
}

/// A running child process and its pipes
///
/// Dropping the handle before [`ProcessHandle::collect`] finishes kills the
/// process.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
    stdin: Option<(ChildStdin, Vec<u8>)>,
    started: Instant,
    _staged: Option<TempPath>,
}

impl ProcessHandle {
    /// OS process id, if the process has not been reaped
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Feed stdin, drain stdout and stderr, and wait for exit, all concurrently
    ///
    /// A process ended by a signal reports exit code `-1`.
    ///
    /// # Errors
    /// Returns `ExecError::IoError` if reading the pipes or waiting fails
    pub async fn collect(mut self) -> Result<RawOutput, ExecError> {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        // The pipe is dropped once written, closing the child's stdin.
        let stdin = self.stdin.take();
        let feed = async move {
            if let Some((mut pipe, input)) = stdin {
                match pipe.write_all(&input).await {
                    Err(e) if e.kind() != io::ErrorKind::BrokenPipe => return Err(e),
                    _ => {}
                }
            }
            Ok::<(), io::Error>(())
        };

        let (status, _, _, ()) = tokio::try_join!(
            self.child.wait(),
            self.stdout.read_to_end(&mut stdout),
            self.stderr.read_to_end(&mut stderr),
            feed,
        )
        .map_err(|e| ExecError::IoError(e.to_string()))?;

        Ok(RawOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr,
            duration: self.started.elapsed(),
        })
    }
}
