use std::thread;
use std::time::{Duration, Instant};

use nbv_core::{ExecutionPod, GoldenNotebook, NotebookExecutionResult, OperationError};
use nbv_exec::{parse_pod, VALIDATOR_CONTAINER};
use nbv_kubectl::{Kubectl, KubectlError};
use tracing::{debug, info};

use crate::parser;

/// Log retrieval and interpretation for a finished validation pod.
pub trait PodLogOperations: Send + Sync {
    /// Waits up to `timeout` for the pod to terminate, then returns the validator container's log.
    fn collect_logs(&self, pod: &ExecutionPod, timeout: Duration) -> Result<String, OperationError>;

    fn parse_results(&self, logs: &str) -> Result<NotebookExecutionResult, OperationError> {
        parser::parse_results(logs)
    }

    fn parse_golden(&self, logs: &str) -> Option<GoldenNotebook> {
        parser::parse_golden(logs)
    }

    fn extract_error(&self, logs: &str) -> String {
        parser::extract_error(logs)
    }
}

pub struct KubectlLogOperations {
    kubectl: Kubectl,
    poll_interval: Duration,
}

impl KubectlLogOperations {
    pub fn new(kubectl: Kubectl) -> Self {
        Self { kubectl, poll_interval: Duration::from_secs(2) }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

fn read_error(pod: &str, err: KubectlError) -> OperationError {
    if err.is_not_found() {
        OperationError::PodLost { pod: pod.to_string() }
    } else {
        OperationError::LogReadFailed(format!("{pod}: {err}"))
    }
}

impl PodLogOperations for KubectlLogOperations {
    fn collect_logs(&self, pod: &ExecutionPod, timeout: Duration) -> Result<String, OperationError> {
        let started = Instant::now();
        loop {
            let obj = self
                .kubectl
                .get("pod", &pod.namespace, &pod.name)
                .map_err(|e| read_error(&pod.name, e))?
                .ok_or_else(|| OperationError::PodLost { pod: pod.name.clone() })?;
            let phase = parse_pod(&obj).phase;
            if phase.is_terminal() {
                break;
            }
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(OperationError::LogCollectionTimeout { pod: pod.name.clone(), timeout_secs: timeout.as_secs() });
            }
            debug!(pod = %pod.name, ?phase, "waiting for validation pod to finish");
            thread::sleep(self.poll_interval.min(timeout - elapsed));
        }
        let logs = self.kubectl.logs(&pod.namespace, &pod.name, VALIDATOR_CONTAINER).map_err(|e| read_error(&pod.name, e))?;
        info!(pod = %pod.name, bytes = logs.len(), "collected validator logs");
        Ok(logs)
    }
}
