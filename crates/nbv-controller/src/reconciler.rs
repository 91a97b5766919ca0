use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use nbv_core::{
    advance, now_unix, plan, validate_spec, BuildPhase, Command, ExecutionPod, ExecutionStatus, GitCredentials, JobKey, JobStatus,
    NotebookExecutionResult, OperationError, Outcome, PodPhase, ReconcilePolicy, Requeue, ValidationJob,
};
use nbv_eval::{check_model, compare, ServingClient};
use nbv_exec::{ExecutionDispatcher, ExecutorConfig, PodApi};
use nbv_logs::PodLogOperations;
use nbv_store::{JobStore, StoreError};
use tracing::{debug, info, info_span, warn};

use crate::git_ops::GitOperations;

/// The operation interfaces a reconciliation pass drives.
#[derive(Clone)]
pub struct Operations {
    pub git: Arc<dyn GitOperations>,
    pub pods: Arc<dyn PodApi>,
    pub logs: Arc<dyn PodLogOperations>,
    pub serving: Arc<dyn ServingClient>,
}

/// What one pass did to a job.
#[derive(Clone, Debug, PartialEq)]
pub struct Pass {
    pub command: Command,
    pub status: JobStatus,
    pub requeue: Requeue,
    /// False when the pass left the status as it found it.
    pub written: bool,
}

/// Imperative shell around the pure engine: load the job, plan, execute, advance, persist.
pub struct Reconciler {
    store: Arc<dyn JobStore>,
    ops: Operations,
    dispatcher: ExecutionDispatcher,
    policy: ReconcilePolicy,
}

impl Reconciler {
    pub fn new(store: Arc<dyn JobStore>, ops: Operations, policy: ReconcilePolicy, executor: ExecutorConfig) -> Self {
        let dispatcher = ExecutionDispatcher::new(ops.pods.clone(), executor);
        Self { store, ops, dispatcher, policy }
    }

    pub fn policy(&self) -> &ReconcilePolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn reconcile(&self, key: &JobKey) -> Result<Option<Pass>> {
        self.reconcile_at(key, now_unix())
    }

    /// One pass at a given clock reading. `None` when the job no longer exists.
    pub fn reconcile_at(&self, key: &JobKey, now: i64) -> Result<Option<Pass>> {
        let span = info_span!("reconcile", job = %key);
        let _guard = span.enter();

        let Some(job) = self.store.get(key).with_context(|| format!("load validation job {key}"))? else {
            debug!("validation job is gone, nothing to do");
            return Ok(None);
        };

        let command = plan(&job, now, &self.policy);
        debug!(phase = ?job.status.phase, command = command_name(&command), "planned");
        let outcome = self.execute(&job, &command);
        if let Outcome::Failed { error } = &outcome {
            warn!(phase = ?job.status.phase, class = ?error.class(), error = %error, "operation failed");
        }

        let transition = advance(&job, outcome, now, &self.policy);
        let written = transition.status != job.status;
        if written {
            if let Err(e) = self.store.update_status(key, &transition.status) {
                if StoreError::is_not_found(&e) {
                    debug!("validation job deleted during the pass");
                    return Ok(None);
                }
                return Err(e.context(format!("write status of {key}")));
            }
            if transition.status.phase != job.status.phase {
                info!(from = ?job.status.phase, to = ?transition.status.phase, message = %transition.status.message, "phase changed");
            }
        }

        Ok(Some(Pass { command, status: transition.status, requeue: transition.requeue, written }))
    }

    fn execute(&self, job: &ValidationJob, command: &Command) -> Outcome {
        let result = match command {
            Command::Initialize => validate_spec(&job.spec).map(|_| Outcome::Initialized),
            Command::ResolveCredentials => self.resolve_credentials(job),
            Command::SkipBuild { image } => Ok(Outcome::BuildSkipped { image: image.clone() }),
            Command::StartBuild => self.ops.git.build_container(job).map(|build| Outcome::BuildStarted { build }),
            Command::PollBuild { build } => self.poll_build(build),
            Command::Dispatch { image } => self.dispatch(job, image, None),
            Command::Redispatch { image, previous } => self.dispatch(job, image, Some(previous)),
            Command::ObservePod { pod } => self.dispatcher.observe(pod).map(|pod| {
                if pod.phase.is_terminal() {
                    Outcome::PodTerminated { pod }
                } else {
                    Outcome::PodRunning { pod }
                }
            }),
            Command::CollectLogs { pod } => self.collect_logs(job, pod),
            Command::Evaluate => self.evaluate(job),
            Command::CollectGarbage { pod } => {
                info!(pod = %pod.name, "retention elapsed, deleting validation pod");
                self.dispatcher.teardown(pod).map(|_| Outcome::GarbageCollected)
            }
            Command::Restart { from_generation } => self.restart(job, *from_generation),
            Command::Abort { error } => Err(error.clone()),
            Command::Wait { requeue_after_secs } => Ok(Outcome::Waited { requeue_after_secs: *requeue_after_secs }),
        };
        result.unwrap_or_else(|error| Outcome::Failed { error })
    }

    fn resolve_credentials(&self, job: &ValidationJob) -> Result<Outcome, OperationError> {
        let creds = self.ops.git.resolve_credentials(job)?;
        // Resolved here only to surface a bad golden reference before anything is built.
        self.ops.git.resolve_golden_credentials(job)?;
        Ok(Outcome::CredentialsResolved { kind: creds.kind() })
    }

    fn poll_build(&self, build: &nbv_core::BuildReference) -> Result<Outcome, OperationError> {
        let current = self.ops.git.build_status(build)?;
        Ok(match (current.phase, current.image.clone()) {
            (BuildPhase::Succeeded, Some(image)) => Outcome::BuildSucceeded { build: current, image },
            _ => Outcome::BuildProgressed { build: current },
        })
    }

    /// Credentials are resolved again on every dispatch; they are never kept in status.
    fn credentials(&self, job: &ValidationJob) -> Result<(GitCredentials, GitCredentials), OperationError> {
        Ok((self.ops.git.resolve_credentials(job)?, self.ops.git.resolve_golden_credentials(job)?))
    }

    fn dispatch(&self, job: &ValidationJob, image: &str, previous: Option<&ExecutionPod>) -> Result<Outcome, OperationError> {
        let (creds, golden) = self.credentials(job)?;
        let pod = match previous {
            Some(previous) => self.dispatcher.redispatch(job, previous, image, &creds, &golden)?,
            None => self.dispatcher.dispatch(job, image, &creds, &golden)?,
        };
        Ok(Outcome::PodDispatched { pod })
    }

    fn collect_logs(&self, job: &ValidationJob, pod: &ExecutionPod) -> Result<Outcome, OperationError> {
        let timeout = Duration::from_secs(self.policy.log_timeout_secs);
        let logs = self.ops.logs.collect_logs(pod, timeout)?;
        let execution = match self.ops.logs.parse_results(&logs) {
            Ok(execution) => execution,
            // The executor died before reporting any cell; keep what the logs say about why.
            Err(OperationError::ParseError(reason)) if pod.phase == PodPhase::Failed => {
                let error = self.ops.logs.extract_error(&logs);
                warn!(pod = %pod.name, %reason, %error, "no cell records from failed validation pod");
                NotebookExecutionResult {
                    status: ExecutionStatus::Failed,
                    exit_code: pod.exit_code,
                    notebook_path: Some(job.spec.notebook.path.clone()),
                    cells: Vec::new(),
                    error: Some(error),
                }
            }
            Err(e) => return Err(e),
        };
        let golden = match &job.spec.golden_notebook {
            Some(_) => self.ops.logs.parse_golden(&logs),
            None => None,
        };
        Ok(Outcome::LogsParsed { execution, golden })
    }

    fn evaluate(&self, job: &ValidationJob) -> Result<Outcome, OperationError> {
        let execution = job.status.execution.as_ref().ok_or_else(|| OperationError::Invariant("evaluating without an execution result".into()))?;
        let golden = job.status.golden.as_ref();
        // A run that failed outright is judged on its own; its pod never got to print a golden block.
        if job.spec.golden_notebook.is_some() && golden.is_none() && execution.status != ExecutionStatus::Failed {
            return Err(OperationError::GoldenNotebookMissing);
        }

        let tolerance = &job.spec.comparison;
        let mut outcome = compare(execution, golden, tolerance)?;
        if let Some(model) = &job.spec.model_validation {
            let check = check_model(self.ops.serving.as_ref(), model, tolerance)?;
            outcome = outcome.with_platform(check);
        }
        Ok(Outcome::Evaluated { outcome })
    }

    fn restart(&self, job: &ValidationJob, from_generation: i64) -> Result<Outcome, OperationError> {
        info!(from_generation, to_generation = job.generation(), "spec changed, restarting validation");
        if let Some(pod) = job.status.pod.as_ref().filter(|_| !job.status.pod_collected) {
            self.dispatcher.teardown(pod)?;
        }
        Ok(Outcome::Restarted)
    }
}

/// Short stable name of a command, for logs and CLI output.
pub fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Initialize => "initialize",
        Command::ResolveCredentials => "resolve-credentials",
        Command::SkipBuild { .. } => "skip-build",
        Command::StartBuild => "start-build",
        Command::PollBuild { .. } => "poll-build",
        Command::Dispatch { .. } => "dispatch",
        Command::Redispatch { .. } => "redispatch",
        Command::ObservePod { .. } => "observe-pod",
        Command::CollectLogs { .. } => "collect-logs",
        Command::Evaluate => "evaluate",
        Command::CollectGarbage { .. } => "collect-garbage",
        Command::Restart { .. } => "restart",
        Command::Abort { .. } => "abort",
        Command::Wait { .. } => "wait",
    }
}
