//! fleetrun CLI
//!
//! Runs a command, script, task or upload on the configured targets and
//! prints the results as a JSON array of status hashes.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use fleetrun_exec::{InputMethod, Runner, ScriptRequest, TaskRequest};
use serde_json::{Map, Value};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod executor;

use config::{Config, Settings};
use executor::Job;

#[derive(Parser)]
#[command(name = "fleetrun")]
#[command(about = "Run commands, scripts, tasks and uploads across targets", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Comma-separated target names (default: all configured targets)
    #[arg(short, long, global = true, value_delimiter = ',')]
    targets: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command line
    #[command(name = "command")]
    Command { command: String },

    /// Stage and run a script
    #[command(name = "script")]
    Script {
        path: PathBuf,
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },

    /// Run a task executable
    #[command(name = "task")]
    Task {
        /// Task name reported in results
        name: String,
        /// Path to the task executable
        executable: PathBuf,
        /// Task parameter as `key=value`; values that parse as JSON are sent as JSON
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
        /// How parameters reach the task (stdin, environment, both)
        #[arg(long, default_value = "both", value_parser = parse_input_method)]
        input_method: InputMethod,
    },

    /// Copy a file or directory to every target
    #[command(name = "upload")]
    Upload {
        source: PathBuf,
        destination: PathBuf,
    },
}

impl From<Commands> for Job {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Command { command } => Job::Command(command),
            Commands::Script { path, args } => {
                Job::Script(ScriptRequest::new(path).with_args(args))
            }
            Commands::Task {
                name,
                executable,
                params,
                input_method,
            } => {
                let params: Map<String, Value> = params.into_iter().collect();
                Job::Task(
                    TaskRequest::new(name, executable)
                        .with_params(params)
                        .with_input_method(input_method),
                )
            }
            Commands::Upload {
                source,
                destination,
            } => Job::Upload {
                source,
                destination,
            },
        }
    }
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn parse_input_method(raw: &str) -> Result<InputMethod, String> {
    match raw {
        "stdin" => Ok(InputMethod::Stdin),
        "environment" | "env" => Ok(InputMethod::Environment),
        "both" => Ok(InputMethod::Both),
        other => Err(format!("unknown input method '{other}'")),
    }
}

fn init_tracing(settings: &Settings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if settings.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let config_path = Config::resolve_path(cli.config.as_deref());
    let config = match &config_path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    init_tracing(&config.settings);
    match &config_path {
        Some(path) => info!(path = %path.display(), "loaded configuration"),
        None => warn!("no config file found, using defaults"),
    }

    let targets = config.select_targets(&cli.targets)?;

    let mut runner = Runner::new();
    if let Some(secs) = config.settings.timeout_secs {
        runner = runner.with_timeout(Duration::from_secs(secs));
    }

    let results = executor::run_all(
        targets,
        Job::from(cli.command),
        runner,
        config.settings.concurrency,
    )
    .await;

    println!("{}", results.to_json()?);

    if !results.is_ok() {
        std::process::exit(2);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("count=3").unwrap(),
            ("count".to_string(), Value::from(3))
        );
        assert_eq!(
            parse_param("name=nginx").unwrap(),
            ("name".to_string(), Value::from("nginx"))
        );
        assert!(parse_param("novalue").is_err());
    }

    #[test]
    fn test_parse_input_method() {
        assert_eq!(parse_input_method("env").unwrap(), InputMethod::Environment);
        assert!(parse_input_method("file").is_err());
    }

    #[test]
    fn test_cli_task_job() {
        let cli = Cli::try_parse_from([
            "fleetrun",
            "--targets",
            "web1,web2",
            "task",
            "svc::restart",
            "/tasks/restart.sh",
            "--param",
            "force=true",
            "--input-method",
            "stdin",
        ])
        .unwrap();

        assert_eq!(cli.targets, ["web1", "web2"]);
        match Job::from(cli.command) {
            Job::Task(request) => {
                assert_eq!(request.name, "svc::restart");
                assert_eq!(request.params["force"], true);
                assert_eq!(request.input_method, InputMethod::Stdin);
            }
            other => panic!("unexpected job: {other:?}"),
        }
    }
}
