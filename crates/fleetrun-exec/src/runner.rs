//! Turns transport output into results
//!
//! Every entry point returns a [`TargetResult`]: adapter faults are caught
//! here and converted with [`TargetResult::from_error`], never swallowed into
//! a made-up exit code.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fleetrun_core::{Action, TargetResult};
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};

use crate::error::ExecError;
use crate::result::{CommandRequest, InputMethod, ScriptRequest, TaskRequest};
use crate::traits::Transport;

/// Runs actions through any [`Transport`] and normalizes the outcome
#[derive(Debug, Clone, Default)]
pub struct Runner {
    timeout: Option<Duration>,
    working_dir: Option<PathBuf>,
}

impl Runner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort each attempt after `timeout`; the process is killed and the
    /// result carries an `EXCEPTION`
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Directory commands run in on transports that ask for one
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    async fn guarded<T, F>(&self, fut: F) -> Result<T, ExecError>
    where
        F: Future<Output = Result<T, ExecError>>,
    {
        match self.timeout {
            Some(limit) => timeout(limit, fut)
                .await
                .map_err(|_| ExecError::Timeout { timeout: limit })?,
            None => fut.await,
        }
    }

    fn failed(transport: &dyn Transport, err: &ExecError, action: Action) -> TargetResult {
        error!(
            target_name = %transport.target().name,
            transport = transport.transport_type(),
            action = %action,
            error = %err,
            "adapter fault"
        );
        TargetResult::from_error(transport.target().clone(), err, action)
    }

    #[instrument(skip(self, transport), fields(target_name = %transport.target().name))]
    pub async fn run_command(&self, transport: &dyn Transport, command: &str) -> TargetResult {
        let mut request = CommandRequest::new(command);
        if transport.capabilities().reset_cwd
            && let Some(dir) = &self.working_dir
        {
            request = request.with_cwd(dir);
        }

        match self.guarded(transport.execute(request)).await {
            Ok(output) => TargetResult::for_command(
                transport.target().clone(),
                output.stdout,
                output.stderr,
                output.exit_code,
                command,
            ),
            Err(e) => Self::failed(transport, &e, Action::Command),
        }
    }

    #[instrument(skip(self, transport, request), fields(target_name = %transport.target().name, script = %request.path.display()))]
    pub async fn run_script(
        &self,
        transport: &dyn Transport,
        request: &ScriptRequest,
    ) -> TargetResult {
        match self.guarded(transport.run_script(request)).await {
            Ok(output) => TargetResult::for_script(
                transport.target().clone(),
                output.stdout,
                output.stderr,
                output.exit_code,
                request.path.display().to_string(),
            ),
            Err(e) => Self::failed(transport, &e, Action::Script),
        }
    }

    /// Run a task; stdin input falls back to environment variables on
    /// transports without stdin support
    #[instrument(skip(self, transport, request), fields(target_name = %transport.target().name, task = %request.name))]
    pub async fn run_task(&self, transport: &dyn Transport, request: &TaskRequest) -> TargetResult {
        let downgraded;
        let request = if request.input_method.uses_stdin() && !transport.capabilities().supports_stdin
        {
            warn!(
                transport = transport.transport_type(),
                "transport has no stdin, passing task parameters through the environment"
            );
            downgraded = request.clone().with_input_method(InputMethod::Environment);
            &downgraded
        } else {
            request
        };

        match self.guarded(transport.run_task(request)).await {
            Ok(output) => TargetResult::for_task(
                transport.target().clone(),
                output.stdout,
                output.stderr,
                output.exit_code,
                request.name.clone(),
            ),
            Err(e) => Self::failed(transport, &e, Action::Task),
        }
    }

    #[instrument(skip(self, transport), fields(target_name = %transport.target().name))]
    pub async fn upload(
        &self,
        transport: &dyn Transport,
        source: &Path,
        destination: &Path,
    ) -> TargetResult {
        match self
            .guarded(transport.copy_file(source, destination))
            .await
        {
            Ok(()) => {
                info!(
                    source = %source.display(),
                    destination = %destination.display(),
                    "upload complete"
                );
                TargetResult::for_upload(
                    transport.target().clone(),
                    &source.display().to_string(),
                    &destination.display().to_string(),
                )
            }
            Err(e) => Self::failed(transport, &e, Action::Upload),
        }
    }
}
