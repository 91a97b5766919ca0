use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of a ValidationJob.
///
/// `Failed` means the notebook ran and validation did not pass; `Error` means the
/// pipeline itself could not finish (terminal error or retries exhausted).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    #[default]
    Pending,
    CredentialsResolving,
    Building,
    Dispatching,
    Executing,
    LogCollecting,
    Evaluating,
    Succeeded,
    Failed,
    Error,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed | Phase::Error)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PodPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, PodPhase::Succeeded | PodPhase::Failed)
    }

    /// Maps the Kubernetes `status.phase` string.
    pub fn from_k8s(s: &str) -> Self {
        match s {
            "Pending" => PodPhase::Pending,
            "Running" => PodPhase::Running,
            "Succeeded" => PodPhase::Succeeded,
            "Failed" => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BuildPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BuildStrategy {
    #[default]
    S2i,
    Tekton,
}

impl BuildStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildStrategy::S2i => "s2i",
            BuildStrategy::Tekton => "tekton",
        }
    }
}

impl fmt::Display for BuildStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialKind {
    SshKey,
    Token,
    BasicAuth,
    None,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CredentialKind::SshKey => "ssh-key",
            CredentialKind::Token => "token",
            CredentialKind::BasicAuth => "basic-auth",
            CredentialKind::None => "none",
        })
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Succeeded,
    Failed,
    Partial,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CellStatus {
    Succeeded,
    Failed,
    Skipped,
    Unknown,
}

/// Model-serving platform a job may check after the notebook ran. Each variant has its own
/// response decoder in `nbv-eval`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ServingPlatform {
    #[serde(rename = "kserve")]
    KServe,
    #[serde(rename = "triton")]
    Triton,
    #[serde(rename = "tensorflow-serving")]
    TensorflowServing,
    #[serde(rename = "seldon")]
    Seldon,
    #[serde(rename = "torchserve")]
    TorchServe,
    #[serde(rename = "vllm")]
    Vllm,
    #[serde(rename = "ray-serve")]
    RayServe,
    #[serde(rename = "bentoml")]
    BentoMl,
}

impl ServingPlatform {
    pub const ALL: [ServingPlatform; 8] = [
        ServingPlatform::KServe,
        ServingPlatform::Triton,
        ServingPlatform::TensorflowServing,
        ServingPlatform::Seldon,
        ServingPlatform::TorchServe,
        ServingPlatform::Vllm,
        ServingPlatform::RayServe,
        ServingPlatform::BentoMl,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ServingPlatform::KServe => "kserve",
            ServingPlatform::Triton => "triton",
            ServingPlatform::TensorflowServing => "tensorflow-serving",
            ServingPlatform::Seldon => "seldon",
            ServingPlatform::TorchServe => "torchserve",
            ServingPlatform::Vllm => "vllm",
            ServingPlatform::RayServe => "ray-serve",
            ServingPlatform::BentoMl => "bentoml",
        }
    }

    /// Accepts the canonical names plus the aliases users commonly write
    /// (`openshift-ai` serves through KServe, `tfserving` for TensorFlow Serving).
    pub fn parse(s: &str) -> Option<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "openshift-ai" | "rhoai" => Some(ServingPlatform::KServe),
            "tfserving" | "tf-serving" => Some(ServingPlatform::TensorflowServing),
            other => Self::ALL.into_iter().find(|p| p.as_str() == other),
        }
    }
}

impl fmt::Display for ServingPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_phases() {
        for p in [Phase::Succeeded, Phase::Failed, Phase::Error] {
            assert!(p.is_terminal());
        }
        for p in [Phase::Pending, Phase::Building, Phase::Executing, Phase::Evaluating] {
            assert!(!p.is_terminal());
        }
    }

    #[test]
    fn platform_names_round_trip_and_aliases() {
        for p in ServingPlatform::ALL {
            assert_eq!(ServingPlatform::parse(p.as_str()), Some(p));
        }
        assert_eq!(ServingPlatform::parse("OpenShift-AI"), Some(ServingPlatform::KServe));
        assert_eq!(ServingPlatform::parse("tfserving"), Some(ServingPlatform::TensorflowServing));
        assert_eq!(ServingPlatform::parse("custom"), None);
    }

    #[test]
    fn pod_phase_from_kubernetes() {
        assert_eq!(PodPhase::from_k8s("Running"), PodPhase::Running);
        assert_eq!(PodPhase::from_k8s("Evicted"), PodPhase::Unknown);
        assert!(PodPhase::Failed.is_terminal());
    }
}
