use std::collections::BTreeMap;
use std::sync::Arc;

use nbv_core::{BuildPhase, BuildReference, BuildStrategy, OperationError, ValidationJob};
use tracing::{debug, info, warn};

use crate::backend::BuildBackend;

/// Build backends keyed by strategy.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<&'static str, Arc<dyn BuildBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, backend: Arc<dyn BuildBackend>) -> Self {
        self.backends.insert(backend.strategy().as_str(), backend);
        self
    }

    pub fn get(&self, strategy: BuildStrategy) -> Option<Arc<dyn BuildBackend>> {
        self.backends.get(strategy.as_str()).cloned()
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn BuildBackend>> {
        self.backends.get(name.trim().to_ascii_lowercase().as_str()).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.backends.keys().copied().collect()
    }
}

/// Starts and polls image builds; one build per job generation.
#[derive(Clone, Default)]
pub struct BuildOrchestrator {
    registry: BackendRegistry,
}

impl BuildOrchestrator {
    pub fn new(registry: BackendRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    fn backend(&self, strategy: BuildStrategy) -> Result<Arc<dyn BuildBackend>, OperationError> {
        self.registry.get(strategy).ok_or_else(|| {
            OperationError::InvalidSpec(format!("build strategy '{strategy}' is not available (registered: {})", self.registry.names().join(", ")))
        })
    }

    /// Returns the build for this generation, creating it only when none exists yet.
    pub fn start_build(&self, job: &ValidationJob) -> Result<BuildReference, OperationError> {
        let spec = job.spec.build.as_ref().ok_or_else(|| OperationError::Invariant("start_build called without a build spec".into()))?;
        let backend = self.backend(spec.strategy)?;
        let name = job.build_name();
        let namespace = &job.metadata.namespace;

        if let Some(existing) = backend.find_build(namespace, &name)? {
            info!(job = %job.key(), build = %name, phase = ?existing.phase, "build already exists, reusing");
            return Ok(existing);
        }
        let build = backend.create_build(job, &name)?;
        info!(job = %job.key(), build = %build.name, strategy = %spec.strategy, "build started");
        Ok(build)
    }

    /// Polls a build. A failed build is reported as `BuildFailed`; success must carry an image.
    pub fn build_status(&self, build: &BuildReference) -> Result<BuildReference, OperationError> {
        let backend = self.backend(build.strategy)?;
        let current = backend.build_status(build)?;
        debug!(build = %current.name, phase = ?current.phase, "build polled");
        match current.phase {
            BuildPhase::Failed => {
                let message = current.message.clone().unwrap_or_else(|| "build failed".into());
                warn!(build = %current.name, %message, "build failed");
                Err(OperationError::BuildFailed { build: current.name, message })
            }
            BuildPhase::Succeeded if current.image.is_none() => {
                Err(OperationError::BuildTransientError(format!("build {} completed but its image is not published yet", current.name)))
            }
            _ => Ok(current),
        }
    }
}
