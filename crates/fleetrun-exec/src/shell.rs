//! Shell strategies
//!
//! A transport picks one [`ShellKind`] when it is created and keeps it for
//! its lifetime. The shell decides how a command line becomes a process
//! invocation and how arguments are quoted.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::TempPath;
use tracing::debug;

use crate::error::ExecError;

const POWERSHELL: &str = "powershell.exe";
const PS_ARGS: [&str; 6] = [
    "-NoProfile",
    "-NonInteractive",
    "-NoLogo",
    "-ExecutionPolicy",
    "Bypass",
    "-File",
];

/// Appended to wrapped PowerShell commands so a failing native command's
/// exit code becomes the script's exit code
const EXIT_FORWARDING: &str =
    "\r\nif (!$?) { if ($LASTEXITCODE) { exit $LASTEXITCODE } else { exit 1 } }";

/// Platform shell family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellKind {
    /// `sh -c`
    Posix,
    /// `powershell.exe -File` on a staged wrapper script
    PowerShell,
}

/// Program and arguments ready to spawn
///
/// Holds the staged wrapper script, if any; it is deleted when the
/// invocation is dropped.
#[derive(Debug)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub staged: Option<TempPath>,
}

impl ShellKind {
    /// Shell for the platform this process runs on
    #[must_use]
    pub fn detect() -> Self {
        if cfg!(windows) {
            ShellKind::PowerShell
        } else {
            ShellKind::Posix
        }
    }

    /// Quote one argument for this shell
    #[must_use]
    pub fn quote(self, arg: &str) -> String {
        match self {
            ShellKind::Posix => {
                let safe = !arg.is_empty()
                    && arg
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || "_-./=:,+@%".contains(c));
                if safe {
                    arg.to_string()
                } else {
                    format!("'{}'", arg.replace('\'', r"'\''"))
                }
            }
            ShellKind::PowerShell => format!("'{}'", arg.replace('\'', "''")),
        }
    }

    /// Join a program and its arguments into a command line
    #[must_use]
    pub fn command_line(self, program: &str, args: &[String]) -> String {
        let mut parts = Vec::with_capacity(args.len() + 1);
        parts.push(self.quote(program));
        parts.extend(args.iter().map(|a| self.quote(a)));
        let line = parts.join(" ");

        match self {
            ShellKind::Posix => line,
            ShellKind::PowerShell => format!("& {line}"),
        }
    }

    /// Turn a command line into a process invocation
    ///
    /// PowerShell commands are written to a temporary `.ps1` under `tmpdir`
    /// with exit-code forwarding appended, unless the command already
    /// invokes PowerShell itself.
    ///
    /// # Errors
    /// Returns `ExecError::Staging` if the wrapper script cannot be written
    pub fn wrap(self, command: &str, tmpdir: &Path) -> Result<Invocation, ExecError> {
        match self {
            ShellKind::Posix => Ok(Invocation {
                program: "sh".to_string(),
                args: vec!["-c".to_string(), command.to_string()],
                staged: None,
            }),
            ShellKind::PowerShell => {
                let mut script = command.to_string();
                if !command.starts_with("powershell") {
                    script.push_str(EXIT_FORWARDING);
                }

                let staged = write_wrapper(&script, tmpdir)?;
                debug!(path = %staged.display(), "staged powershell wrapper");

                let mut args: Vec<String> = PS_ARGS.iter().map(ToString::to_string).collect();
                args.push(staged.display().to_string());

                Ok(Invocation {
                    program: POWERSHELL.to_string(),
                    args,
                    staged: Some(staged),
                })
            }
        }
    }
}

fn write_wrapper(script: &str, tmpdir: &Path) -> Result<TempPath, ExecError> {
    let staging_err = |e: std::io::Error| ExecError::Staging {
        path: tmpdir.to_path_buf(),
        message: e.to_string(),
    };

    let mut file = tempfile::Builder::new()
        .prefix("wrapper")
        .suffix(".ps1")
        .tempfile_in(tmpdir)
        .map_err(staging_err)?;
    file.write_all(script.as_bytes()).map_err(staging_err)?;
    file.flush().map_err(staging_err)?;

    Ok(file.into_temp_path())
}
