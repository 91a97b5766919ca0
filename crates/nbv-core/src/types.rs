use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::{conditions::Condition, error::*, ids::*, model::*, results::*, tolerance::Tolerance};

pub const API_VERSION: &str = "nbv.io/v1alpha1";
pub const KIND: &str = "NotebookValidationJob";

/// The declarative validation request, shaped like the custom resource it is stored as.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationJob {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: JobSpec,
    #[serde(default)]
    pub status: JobStatus,
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_kind() -> String {
    KIND.to_string()
}

impl ValidationJob {
    pub fn new(key: JobKey, spec: JobSpec) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta { name: key.name, namespace: key.namespace, uid: Some(JobUid::new()), generation: 1, labels: BTreeMap::new() },
            spec,
            status: JobStatus::default(),
        }
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(self.metadata.namespace.clone(), self.metadata.name.clone())
    }

    pub fn generation(&self) -> i64 {
        self.metadata.generation
    }

    /// Deterministic per generation, so a repeated start finds the build it already created.
    pub fn build_name(&self) -> String {
        format!("{}-build-g{}", self.metadata.name, self.metadata.generation)
    }

    pub fn pod_name(&self, attempt: u32) -> String {
        format!("{}-g{}-a{}", self.metadata.name, self.metadata.generation, attempt)
    }

    pub fn credentials_secret_name(&self, attempt: u32) -> String {
        format!("{}-git-g{}-a{}", self.metadata.name, self.metadata.generation, attempt)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<JobUid>,
    #[serde(default = "default_generation")]
    pub generation: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_generation() -> i64 {
    1
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub notebook: NotebookSource,
    #[serde(default)]
    pub pod_config: PodConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub golden_notebook: Option<NotebookSource>,
    #[serde(default)]
    pub comparison: Tolerance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_validation: Option<ModelValidationSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl JobSpec {
    /// Short content hash stamped on pods so a reused generation number cannot hide a spec change.
    pub fn digest(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        let hash = Sha256::digest(&json);
        hex::encode(&hash[..8])
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotebookSource {
    pub git: GitSource,
    pub path: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GitSource {
    pub url: String,
    #[serde(rename = "ref", default = "default_git_ref")]
    pub git_ref: String,
    /// Name of the secret holding clone credentials; absent means anonymous.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_secret: Option<String>,
}

fn default_git_ref() -> String {
    "main".to_string()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodConfig {
    #[serde(default)]
    pub container_image: String,
    #[serde(default)]
    pub resources: ResourceRequirements,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    #[serde(default)]
    pub env: Vec<EnvVar>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildSpec {
    #[serde(default)]
    pub strategy: BuildStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements_file: Option<String>,
    /// Target image; backends derive one from the job name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_image: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelValidationSpec {
    pub platform: ServingPlatform,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub request: serde_json::Value,
    #[serde(default)]
    pub expected: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildReference {
    pub name: String,
    pub namespace: String,
    pub strategy: BuildStrategy,
    pub generation: i64,
    pub phase: BuildPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPod {
    pub name: String,
    pub namespace: String,
    pub generation: i64,
    pub attempt: u32,
    pub phase: PodPhase,
    /// Waiting or termination reason reported by the kubelet (`ImagePullBackOff`, `OOMKilled`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_digest: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub class: ErrorClass,
    pub phase: Phase,
    pub component: Component,
    pub message: String,
    /// The pod itself is gone or cannot run, so the next attempt needs a new one.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub replace_pod: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct JobStatus {
    pub phase: Phase,
    pub observed_generation: i64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub retries: BTreeMap<Phase, u32>,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod: Option<ExecutionPod>,
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<NotebookExecutionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub golden: Option<GoldenNotebook>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ValidationOutcome>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<i64>,
    pub pod_collected: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl JobStatus {
    pub fn retries_in(&self, phase: Phase) -> u32 {
        self.retries.get(&phase).copied().unwrap_or(0)
    }
}
