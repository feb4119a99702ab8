//! Parallel execution across targets
//!
//! One worker per target, at most `concurrency` at a time. Each worker owns
//! its transport and returns exactly one result; nothing is shared between
//! workers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use fleetrun_core::{Action, Reportable, ResultSet, TargetResult};
use fleetrun_exec::{LocalTransport, Runner, ScriptRequest, TaskRequest};
use thiserror::Error;
use tokio::task::{Id, JoinSet};
use tracing::{error, info};

use crate::config::TargetConfig;

/// What to run on every target
#[derive(Debug, Clone)]
pub enum Job {
    Command(String),
    Script(ScriptRequest),
    Task(TaskRequest),
    Upload {
        source: PathBuf,
        destination: PathBuf,
    },
}

impl Job {
    #[must_use]
    pub fn action(&self) -> Action {
        match self {
            Job::Command(_) => Action::Command,
            Job::Script(_) => Action::Script,
            Job::Task(_) => Action::Task,
            Job::Upload { .. } => Action::Upload,
        }
    }

    async fn run(&self, runner: &Runner, transport: &LocalTransport) -> TargetResult {
        match self {
            Job::Command(command) => runner.run_command(transport, command).await,
            Job::Script(request) => runner.run_script(transport, request).await,
            Job::Task(request) => runner.run_task(transport, request).await,
            Job::Upload {
                source,
                destination,
            } => runner.upload(transport, source, destination).await,
        }
    }
}

/// A worker died before producing a result
#[derive(Debug, Error)]
#[error("worker for {target} stopped: {reason}")]
struct WorkerFailed {
    target: String,
    reason: String,
}

impl Reportable for WorkerFailed {}

/// Run a job on every target and collect the results in target order
///
/// At most `concurrency` workers run at once; a new one starts as soon as
/// any running worker finishes.
pub async fn run_all(
    targets: Vec<TargetConfig>,
    job: Job,
    runner: Runner,
    concurrency: usize,
) -> ResultSet {
    let job = Arc::new(job);
    let runner = Arc::new(runner);
    let total = targets.len();
    let limit = concurrency.max(1);

    info!(total_targets = total, concurrency = limit, action = %job.action(), "starting run");

    let mut slots: Vec<Option<TargetResult>> = vec![None; total];
    let mut running: HashMap<Id, usize> = HashMap::new();
    let mut workers = JoinSet::new();
    let mut pending = targets.iter().enumerate();

    loop {
        while workers.len() < limit {
            let Some((index, config)) = pending.next() else {
                break;
            };
            let job = Arc::clone(&job);
            let runner = Arc::clone(&runner);
            let transport = LocalTransport::new(config.target(), config.local.clone());

            let handle = workers.spawn(async move { job.run(&runner, &transport).await });
            running.insert(handle.id(), index);
        }

        let Some(joined) = workers.join_next_with_id().await else {
            break;
        };
        match joined {
            Ok((id, result)) => {
                if let Some(index) = running.remove(&id) {
                    slots[index] = Some(result);
                }
            }
            Err(e) => {
                let Some(index) = running.remove(&e.id()) else {
                    continue;
                };
                let target = targets[index].target();
                error!(target_name = %target.name, error = %e, "worker failed");
                let failure = WorkerFailed {
                    target: target.name.clone(),
                    reason: e.to_string(),
                };
                slots[index] = Some(TargetResult::from_error(target, &failure, job.action()));
            }
        }
    }

    let set: ResultSet = slots.into_iter().flatten().collect();
    info!(
        total = total,
        failed = set.error_set().len(),
        "run finished"
    );
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetrun_exec::LocalOptions;

    fn targets(names: &[&str]) -> Vec<TargetConfig> {
        names
            .iter()
            .map(|name| TargetConfig {
                name: (*name).to_string(),
                host: None,
                local: LocalOptions::default(),
            })
            .collect()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_all_keeps_target_order() {
        let set = run_all(
            targets(&["a", "b", "c"]),
            Job::Command("echo ok".to_string()),
            Runner::new(),
            2,
        )
        .await;

        assert_eq!(set.names(), ["a", "b", "c"]);
        assert!(set.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_all_collects_failures() {
        let set = run_all(
            targets(&["a", "b"]),
            Job::Command("exit 5".to_string()),
            Runner::new(),
            0,
        )
        .await;

        assert_eq!(set.error_set().len(), 2);
        assert_eq!(
            set.first().unwrap().error().unwrap().issue_code,
            "COMMAND_ERROR"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_all_refills_free_slots() {
        let mut configs = targets(&["slow", "fast1", "fast2"]);
        for (config, delay) in configs.iter_mut().zip(["1.0", "0.6", "0.6"]) {
            config
                .local
                .env_vars
                .insert("DELAY".to_string(), delay.to_string());
        }

        let started = std::time::Instant::now();
        let set = run_all(configs, Job::Command("sleep $DELAY".to_string()), Runner::new(), 2).await;

        // fast2 starts when fast1 frees its slot, not after slow finishes
        assert!(started.elapsed() < std::time::Duration::from_millis(1500));
        assert_eq!(set.names(), ["slow", "fast1", "fast2"]);
        assert!(set.is_ok());
    }

    #[tokio::test]
    async fn test_upload_job() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src.txt");
        let destination = dir.path().join("dst.txt");
        std::fs::write(&source, "payload").unwrap();

        let set = run_all(
            targets(&["local"]),
            Job::Upload {
                source: source.clone(),
                destination: destination.clone(),
            },
            Runner::new(),
            1,
        )
        .await;

        assert!(set.is_ok());
        assert_eq!(std::fs::read_to_string(&destination).unwrap(), "payload");
        assert!(set.first().unwrap().has_message());
    }
}
