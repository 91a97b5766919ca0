use std::sync::Arc;

use nbv_core::{ExecutionPod, GitCredentials, OperationError, ValidationJob};
use tracing::{debug, info, warn};

use crate::analyzer::analyze_pod;
use crate::manifest::{credentials_secret_manifest, job_selector, pod_manifest, ExecutorConfig};
use crate::pod::{PodApi, PodInfo};

/// Launches and watches validation pods. Holds no per-job state; the cluster is the record.
pub struct ExecutionDispatcher {
    api: Arc<dyn PodApi>,
    config: ExecutorConfig,
}

impl ExecutionDispatcher {
    pub fn new(api: Arc<dyn PodApi>, config: ExecutorConfig) -> Self {
        Self { api, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Ensures exactly one pod runs for the job's current spec. An active pod of the same
    /// generation and spec digest is returned as is; anything older is torn down first.
    pub fn dispatch(&self, job: &ValidationJob, image: &str, creds: &GitCredentials, golden: &GitCredentials) -> Result<ExecutionPod, OperationError> {
        let namespace = &job.metadata.namespace;
        let digest = job.spec.digest();
        let active = self.api.find_active_pods(namespace, &job_selector(job))?;

        let (current, stale): (Vec<PodInfo>, Vec<PodInfo>) =
            active.into_iter().partition(|p| p.generation() == job.generation() && p.label(crate::pod::LABEL_SPEC_DIGEST) == Some(digest.as_str()));
        for pod in &stale {
            info!(job = %job.key(), pod = %pod.name, generation = pod.generation(), "tearing down stale validation pod");
            self.teardown_pod(job, pod)?;
        }
        if let Some(existing) = current.into_iter().max_by_key(PodInfo::attempt) {
            debug!(job = %job.key(), pod = %existing.name, "validation pod already active");
            return Ok(existing.to_execution_pod());
        }

        let attempt = job.status.attempt + 1;
        self.launch(job, image, attempt, creds, golden)
    }

    /// Replaces a lost or stuck pod with the next attempt.
    pub fn redispatch(&self, job: &ValidationJob, previous: &ExecutionPod, image: &str, creds: &GitCredentials, golden: &GitCredentials) -> Result<ExecutionPod, OperationError> {
        warn!(job = %job.key(), pod = %previous.name, attempt = previous.attempt, "replacing validation pod");
        self.teardown(previous)?;
        for pod in self.api.find_active_pods(&job.metadata.namespace, &job_selector(job))? {
            self.teardown_pod(job, &pod)?;
        }
        let attempt = job.status.attempt.max(previous.attempt) + 1;
        self.launch(job, image, attempt, creds, golden)
    }

    fn launch(&self, job: &ValidationJob, image: &str, attempt: u32, creds: &GitCredentials, golden: &GitCredentials) -> Result<ExecutionPod, OperationError> {
        if let Some(secret) = credentials_secret_manifest(job, attempt, creds, golden) {
            self.api.apply_secret(&secret)?;
        }
        let manifest = pod_manifest(job, image, attempt, creds, golden, &self.config);
        let pod = self.api.create_pod(&manifest)?;
        info!(job = %job.key(), pod = %pod.name, attempt, image, credentials = %creds.kind(), "validation pod created");
        Ok(pod.to_execution_pod())
    }

    /// Reports the pod's current state. A vanished pod is `PodLost`; a stuck one is
    /// `PodUnhealthy` and a broken one a terminal error, per the failure analysis.
    pub fn observe(&self, pod: &ExecutionPod) -> Result<ExecutionPod, OperationError> {
        let info = self.api.get_pod(&pod.namespace, &pod.name)?.ok_or_else(|| OperationError::PodLost { pod: pod.name.clone() })?;
        if let Some(failure) = analyze_pod(&info) {
            warn!(pod = %pod.name, reason = %failure.reason, transient = failure.transient, "validation pod failed to run");
            return Err(failure.into_error(&pod.name));
        }
        Ok(info.to_execution_pod())
    }

    /// Deletes a pod and its per-attempt credentials secret.
    pub fn teardown(&self, pod: &ExecutionPod) -> Result<(), OperationError> {
        self.api.delete_pod(&pod.namespace, &pod.name)?;
        self.api.delete_secret(&pod.namespace, &secret_name_for(&pod.name))
    }

    fn teardown_pod(&self, job: &ValidationJob, pod: &PodInfo) -> Result<(), OperationError> {
        self.api.delete_pod(&pod.namespace, &pod.name)?;
        let secret = format!("{}-git-g{}-a{}", job.metadata.name, pod.generation(), pod.attempt());
        self.api.delete_secret(&pod.namespace, &secret)
    }
}

/// Pod `<job>-g<gen>-a<n>` pairs with secret `<job>-git-g<gen>-a<n>`.
fn secret_name_for(pod_name: &str) -> String {
    match pod_name.rfind("-g") {
        Some(idx) => format!("{}-git{}", &pod_name[..idx], &pod_name[idx..]),
        None => format!("{pod_name}-git"),
    }
}
