use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use fleetrun_core::{Action, ResultSet, Status, Target};
use fleetrun_exec::{
    Capabilities, CommandRequest, ExecError, InputMethod, LocalOptions, LocalTransport, RawOutput,
    Runner, ScriptRequest, ShellKind, TaskRequest, Transport,
};

// Mock transport replaying canned output
struct MockTransport {
    target: Target,
    output: Result<RawOutput, ExecError>,
    supports_stdin: bool,
    delay: Duration,
    seen_tasks: Mutex<Vec<TaskRequest>>,
}

impl MockTransport {
    fn new(name: &str, output: Result<RawOutput, ExecError>) -> Self {
        Self {
            target: Target::new(name),
            output,
            supports_stdin: true,
            delay: Duration::ZERO,
            seen_tasks: Mutex::new(Vec::new()),
        }
    }

    fn raw(stdout: &str, stderr: &str, exit_code: i32) -> Result<RawOutput, ExecError> {
        Ok(RawOutput {
            exit_code,
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
            duration: Duration::from_millis(1),
        })
    }

    async fn reply(&self) -> Result<RawOutput, ExecError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.output.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn target(&self) -> &Target {
        &self.target
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            reset_cwd: false,
            supports_stdin: self.supports_stdin,
            shell: ShellKind::Posix,
        }
    }

    fn transport_type(&self) -> &'static str {
        "mock"
    }

    async fn execute(&self, _request: CommandRequest) -> Result<RawOutput, ExecError> {
        self.reply().await
    }

    async fn run_script(&self, _request: &ScriptRequest) -> Result<RawOutput, ExecError> {
        self.reply().await
    }

    async fn run_task(&self, request: &TaskRequest) -> Result<RawOutput, ExecError> {
        self.seen_tasks.lock().unwrap().push(request.clone());
        self.reply().await
    }

    async fn copy_file(&self, _source: &Path, destination: &Path) -> Result<(), ExecError> {
        match &self.output {
            Ok(_) => Ok(()),
            Err(_) => Err(ExecError::copy(destination, "disk full")),
        }
    }
}

#[tokio::test]
async fn test_command_result_from_mock() {
    let transport = MockTransport::new("web1", MockTransport::raw("", "", 1));
    let result = Runner::new().run_command(&transport, "exit 1").await;

    assert_eq!(result.status(), Status::Failure);
    assert_eq!(result.object(), Some("exit 1"));
    assert_eq!(
        result.error().unwrap().msg,
        "The command failed with exit code 1"
    );
}

#[tokio::test]
async fn test_adapter_fault_becomes_exception() {
    let transport = MockTransport::new(
        "web1",
        Err(ExecError::ConnectionFailed("connection refused".into())),
    );
    let result = Runner::new().run_command(&transport, "uptime").await;
    let error = result.error().unwrap();

    assert_eq!(result.action(), Action::Command);
    assert_eq!(error.issue_code, "EXCEPTION");
    assert_eq!(error.msg, "connection failed: connection refused");
    assert!(error.details["class"].as_str().unwrap().contains("ExecError"));
}

#[tokio::test]
async fn test_upload_failure_keeps_copy_error() {
    let transport = MockTransport::new("web1", Err(ExecError::IoError("gone".into())));
    let result = Runner::new()
        .upload(&transport, Path::new("/local/f"), Path::new("/remote/f"))
        .await;
    let error = result.error().unwrap();

    assert_eq!(result.action(), Action::Upload);
    assert_eq!(error.issue_code, "COPY_ERROR");
    assert_eq!(error.details["path"], "/remote/f");
}

#[tokio::test]
async fn test_upload_success_message() {
    let transport = MockTransport::new("web1", MockTransport::raw("", "", 0));
    let result = Runner::new()
        .upload(&transport, Path::new("/local/f"), Path::new("dest/path"))
        .await;

    assert!(result.is_ok());
    assert_eq!(
        result.message(),
        Some("Uploaded '/local/f' to 'web1:dest/path'")
    );
}

#[tokio::test]
async fn test_task_self_report_wins_over_exit_code() {
    let stdout = r#"{"_error":{"msg":"package missing","kind":"pkg/missing"}}"#;
    let transport = MockTransport::new("db1", MockTransport::raw(stdout, "", 1));
    let request = TaskRequest::new("pkg::install", "/tasks/install.sh");
    let result = Runner::new().run_task(&transport, &request).await;
    let error = result.error().unwrap();

    assert_eq!(result.object(), Some("pkg::install"));
    assert_eq!(error.msg, "package missing");
    assert_eq!(error.kind, "pkg/missing");
}

#[tokio::test]
async fn test_task_stdin_downgraded_without_support() {
    let mut transport = MockTransport::new("db1", MockTransport::raw("{}", "", 0));
    transport.supports_stdin = false;
    let request = TaskRequest::new("t", "/tasks/t.sh").with_input_method(InputMethod::Stdin);

    let result = Runner::new().run_task(&transport, &request).await;

    assert!(result.is_ok());
    let seen = transport.seen_tasks.lock().unwrap();
    assert_eq!(seen[0].input_method, InputMethod::Environment);
}

#[tokio::test]
async fn test_timeout_becomes_exception() {
    let mut transport = MockTransport::new("slow", MockTransport::raw("", "", 0));
    transport.delay = Duration::from_secs(5);

    let result = Runner::new()
        .with_timeout(Duration::from_millis(50))
        .run_script(&transport, &ScriptRequest::new("/scripts/slow.sh"))
        .await;
    let error = result.error().unwrap();

    assert_eq!(result.action(), Action::Script);
    assert_eq!(error.issue_code, "EXCEPTION");
    assert!(error.msg.starts_with("operation timed out"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_local_transport_end_to_end() {
    let runner = Runner::new();
    let transport = LocalTransport::new(Target::new("localhost"), LocalOptions::default());

    let ok = runner.run_command(&transport, "echo hello").await;
    let failed = runner.run_command(&transport, "echo oops >&2; exit 3").await;

    assert!(ok.is_ok());
    assert_eq!(ok.value()["stdout"], "hello\n");
    assert_eq!(failed.value()["stderr"], "oops\n");
    assert_eq!(failed.error().unwrap().details["exit_code"], 3);

    let set: ResultSet = vec![ok, failed].into_iter().collect();
    assert_eq!(set.error_set().len(), 1);
}

// A process that is gone or only waiting to be reaped
#[cfg(target_os = "linux")]
fn process_ended(pid: &str) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .is_some_and(|(_, rest)| rest.trim_start().starts_with(['Z', 'X'])),
        Err(_) => true,
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_local_timeout_kills_process() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("pid");
    let command = format!("echo $$ > '{}'; exec sleep 30", pid_file.display());

    let runner = Runner::new().with_timeout(Duration::from_millis(500));
    let transport = LocalTransport::new(Target::new("localhost"), LocalOptions::default());
    let result = runner.run_command(&transport, &command).await;

    assert_eq!(result.error().unwrap().issue_code, "EXCEPTION");

    let pid = std::fs::read_to_string(&pid_file).unwrap();
    let pid = pid.trim();
    let mut ended = false;
    for _ in 0..50 {
        if process_ended(pid) {
            ended = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(ended, "process {pid} still running after timeout");
}

#[cfg(unix)]
#[tokio::test]
async fn test_local_task_json_result() {
    let dir = tempfile::tempdir().unwrap();
    let task = dir.path().join("status.sh");
    std::fs::write(&task, "#!/bin/sh\necho '{\"status\":\"running\",\"pid\":42}'\n").unwrap();

    let transport = LocalTransport::new(Target::new("localhost"), LocalOptions::default());
    let result = Runner::new()
        .run_task(&transport, &TaskRequest::new("svc::status", &task))
        .await;

    assert!(result.is_ok());
    assert_eq!(result.value()["status"], "running");
    assert_eq!(result.value()["pid"], 42);
}

#[cfg(unix)]
#[tokio::test]
async fn test_local_working_dir() {
    let dir = tempfile::tempdir().unwrap();
    let transport = LocalTransport::new(Target::new("localhost"), LocalOptions::default());
    let result = Runner::new()
        .with_working_dir(dir.path())
        .run_command(&transport, "pwd")
        .await;

    let reported = std::path::PathBuf::from(result.value()["stdout"].as_str().unwrap().trim());
    assert_eq!(
        reported.canonicalize().unwrap(),
        dir.path().canonicalize().unwrap()
    );
}
