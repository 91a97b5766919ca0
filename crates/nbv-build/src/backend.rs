use nbv_core::{BuildReference, BuildStrategy, OperationError, ValidationJob};
use nbv_kubectl::KubectlError;

pub const DEFAULT_BASE_IMAGE: &str = "quay.io/jupyter/minimal-notebook:latest";
pub const INTERNAL_REGISTRY: &str = "image-registry.openshift-image-registry.svc:5000";

/// A container build system. Production backends talk to the cluster; tests use `FakeBuildBackend`.
pub trait BuildBackend: Send + Sync {
    fn strategy(&self) -> BuildStrategy;

    /// Existing build with this deterministic name, if any.
    fn find_build(&self, namespace: &str, name: &str) -> Result<Option<BuildReference>, OperationError>;

    fn create_build(&self, job: &ValidationJob, name: &str) -> Result<BuildReference, OperationError>;

    fn build_status(&self, build: &BuildReference) -> Result<BuildReference, OperationError>;
}

/// Image a build pushes to: the configured output image or the in-cluster registry.
pub fn output_image(job: &ValidationJob) -> String {
    job.spec
        .build
        .as_ref()
        .and_then(|b| b.output_image.clone())
        .unwrap_or_else(|| format!("{INTERNAL_REGISTRY}/{}/{}:g{}", job.metadata.namespace, job.metadata.name, job.generation()))
}

pub fn base_image(job: &ValidationJob) -> String {
    job.spec.build.as_ref().and_then(|b| b.base_image.clone()).unwrap_or_else(|| DEFAULT_BASE_IMAGE.to_string())
}

/// Maps a CLI failure: API outages retry, everything else fails the build.
pub fn classify(build: &str, err: KubectlError) -> OperationError {
    if err.is_transient() {
        OperationError::BuildTransientError(format!("{build}: {err}"))
    } else {
        OperationError::BuildFailed { build: build.to_string(), message: err.to_string() }
    }
}

pub fn pending_reference(job: &ValidationJob, name: &str, strategy: BuildStrategy) -> BuildReference {
    BuildReference {
        name: name.to_string(),
        namespace: job.metadata.namespace.clone(),
        strategy,
        generation: job.generation(),
        phase: nbv_core::BuildPhase::Pending,
        image: None,
        message: None,
    }
}
