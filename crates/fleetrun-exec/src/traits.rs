//! Transport trait

use std::path::Path;

use async_trait::async_trait;
use fleetrun_core::Target;

use crate::error::ExecError;
use crate::result::{CommandRequest, RawOutput, ScriptRequest, TaskRequest};
use crate::shell::ShellKind;

/// What a transport can do, queried instead of branching on transport type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Commands must be given an explicit working directory to run in
    pub reset_cwd: bool,
    /// Bytes can be written to the process's stdin
    pub supports_stdin: bool,
    /// Shell chosen for this connection
    pub shell: ShellKind,
}

/// One connectivity mechanism to one target
///
/// Implementations only run things and hand back raw output. Interpreting
/// that output is left to [`Runner`](crate::Runner).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Target this transport is connected to
    fn target(&self) -> &Target;

    fn capabilities(&self) -> Capabilities;

    /// Short name of the transport, e.g. `local`
    fn transport_type(&self) -> &'static str;

    /// Run a command line to completion
    async fn execute(&self, request: CommandRequest) -> Result<RawOutput, ExecError>;

    /// Stage a script on the target, run it, and clean up
    async fn run_script(&self, request: &ScriptRequest) -> Result<RawOutput, ExecError>;

    /// Stage a task executable, feed it parameters, run it, and clean up
    async fn run_task(&self, request: &TaskRequest) -> Result<RawOutput, ExecError>;

    /// Copy a file or directory, replacing whatever is at the destination
    async fn copy_file(&self, source: &Path, destination: &Path) -> Result<(), ExecError>;
}
