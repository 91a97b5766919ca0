use nbv_core::OperationError;

use crate::pod::{ContainerState, PodInfo};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodFailure {
    pub reason: String,
    pub container: Option<String>,
    pub transient: bool,
    pub message: String,
}

impl PodFailure {
    /// A transient failure asks for a new pod; anything else rejects the job.
    pub fn into_error(self, pod: &str) -> OperationError {
        let detail = match &self.container {
            Some(c) => format!("{} in container {c}: {}", self.reason, self.message),
            None => format!("{}: {}", self.reason, self.message),
        };
        if self.transient {
            OperationError::PodUnhealthy { pod: pod.to_string(), reason: detail }
        } else {
            OperationError::DispatchRejected(detail)
        }
    }
}

fn waiting_failure(c: &ContainerState) -> Option<PodFailure> {
    let reason = c.waiting_reason.as_deref()?;
    let (transient, hint) = match reason {
        "ImagePullBackOff" | "ErrImagePull" => (true, "image could not be pulled; check the image name and pull secrets"),
        "CrashLoopBackOff" => (false, "container keeps crashing"),
        "RunContainerError" => (false, "container runtime could not start the container"),
        "CreateContainerConfigError" | "CreateContainerError" => (false, "container configuration is invalid (missing secret or config map?)"),
        "InvalidImageName" => (false, "image name is invalid"),
        _ => return None,
    };
    let message = c.waiting_message.clone().unwrap_or_else(|| hint.to_string());
    Some(PodFailure { reason: reason.to_string(), container: Some(c.name.clone()), transient, message })
}

/// Classifies a stuck or broken pod. `None` means the pod is healthy or failed only because
/// the notebook did, which log collection reports.
pub fn analyze_pod(pod: &PodInfo) -> Option<PodFailure> {
    for c in &pod.init_containers {
        if let Some(f) = waiting_failure(c) {
            return Some(f);
        }
        if let Some(code) = c.exit_code.filter(|code| *code != 0) {
            let oom = c.terminated_reason.as_deref() == Some("OOMKilled");
            return Some(PodFailure {
                reason: if oom { "OOMKilled".into() } else { "InitContainerError".into() },
                container: Some(c.name.clone()),
                transient: false,
                message: format!("init container exited with code {code}"),
            });
        }
    }
    for c in &pod.containers {
        if let Some(f) = waiting_failure(c) {
            return Some(f);
        }
        if c.terminated_reason.as_deref() == Some("OOMKilled") {
            return Some(PodFailure {
                reason: "OOMKilled".into(),
                container: Some(c.name.clone()),
                transient: false,
                message: "container exceeded its memory limit; raise podConfig.resources.limits.memory".into(),
            });
        }
    }
    pod.unschedulable.as_ref().map(|message| PodFailure { reason: "Unschedulable".into(), container: None, transient: true, message: message.clone() })
}
