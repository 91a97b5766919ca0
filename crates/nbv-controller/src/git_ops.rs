use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use nbv_build::{BackendRegistry, BuildOrchestrator, FakeBuildBackend};
use nbv_core::{BuildReference, BuildStrategy, GitCredentials, OperationError, ValidationJob};
use nbv_secrets::CredentialResolver;

/// Everything the controller needs from Git hosting and the build system.
pub trait GitOperations: Send + Sync {
    fn resolve_credentials(&self, job: &ValidationJob) -> Result<GitCredentials, OperationError>;

    fn resolve_golden_credentials(&self, job: &ValidationJob) -> Result<GitCredentials, OperationError>;

    /// Starts (or finds) the image build for the job's current generation.
    fn build_container(&self, job: &ValidationJob) -> Result<BuildReference, OperationError>;

    fn build_status(&self, build: &BuildReference) -> Result<BuildReference, OperationError>;
}

/// Production implementation over the credential resolver and the build orchestrator.
#[derive(Clone)]
pub struct ClusterGitOperations {
    resolver: CredentialResolver,
    builds: BuildOrchestrator,
}

impl ClusterGitOperations {
    pub fn new(resolver: CredentialResolver, builds: BuildOrchestrator) -> Self {
        Self { resolver, builds }
    }
}

impl GitOperations for ClusterGitOperations {
    fn resolve_credentials(&self, job: &ValidationJob) -> Result<GitCredentials, OperationError> {
        self.resolver.resolve(job)
    }

    fn resolve_golden_credentials(&self, job: &ValidationJob) -> Result<GitCredentials, OperationError> {
        self.resolver.resolve_golden(job)
    }

    fn build_container(&self, job: &ValidationJob) -> Result<BuildReference, OperationError> {
        self.builds.start_build(job)
    }

    fn build_status(&self, build: &BuildReference) -> Result<BuildReference, OperationError> {
        self.builds.build_status(build)
    }
}

/// Test double. Credential replies are served in order (the last one repeats, the default is
/// an anonymous clone); builds run through scripted fake backends.
pub struct MockGitOperations {
    s2i: Arc<FakeBuildBackend>,
    tekton: Arc<FakeBuildBackend>,
    builds: BuildOrchestrator,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    credentials: VecDeque<Result<GitCredentials, OperationError>>,
    golden: VecDeque<Result<GitCredentials, OperationError>>,
    resolve_calls: usize,
    golden_calls: usize,
    build_calls: usize,
    status_calls: usize,
}

impl Default for MockGitOperations {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGitOperations {
    pub fn new() -> Self {
        let s2i = Arc::new(FakeBuildBackend::new(BuildStrategy::S2i));
        let tekton = Arc::new(FakeBuildBackend::new(BuildStrategy::Tekton));
        let builds = BuildOrchestrator::new(BackendRegistry::new().register(s2i.clone()).register(tekton.clone()));
        Self { s2i, tekton, builds, inner: Mutex::new(Inner::default()) }
    }

    pub fn with_credentials(self, creds: GitCredentials) -> Self {
        self.push_credentials(Ok(creds));
        self
    }

    pub fn push_credentials(&self, reply: Result<GitCredentials, OperationError>) {
        self.lock().credentials.push_back(reply);
    }

    pub fn push_golden_credentials(&self, reply: Result<GitCredentials, OperationError>) {
        self.lock().golden.push_back(reply);
    }

    /// Fake backend behind a strategy, for scripting build phases and failures.
    pub fn backend(&self, strategy: BuildStrategy) -> &FakeBuildBackend {
        match strategy {
            BuildStrategy::S2i => &self.s2i,
            BuildStrategy::Tekton => &self.tekton,
        }
    }

    pub fn resolve_calls(&self) -> usize {
        self.lock().resolve_calls
    }

    pub fn golden_calls(&self) -> usize {
        self.lock().golden_calls
    }

    pub fn build_calls(&self) -> usize {
        self.lock().build_calls
    }

    pub fn status_calls(&self) -> usize {
        self.lock().status_calls
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn next_reply(queue: &mut VecDeque<Result<GitCredentials, OperationError>>) -> Result<GitCredentials, OperationError> {
    let reply = if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() };
    reply.unwrap_or(Ok(GitCredentials::None))
}

impl GitOperations for MockGitOperations {
    fn resolve_credentials(&self, _job: &ValidationJob) -> Result<GitCredentials, OperationError> {
        let mut inner = self.lock();
        inner.resolve_calls += 1;
        next_reply(&mut inner.credentials)
    }

    fn resolve_golden_credentials(&self, job: &ValidationJob) -> Result<GitCredentials, OperationError> {
        let mut inner = self.lock();
        inner.golden_calls += 1;
        if job.spec.golden_notebook.is_none() {
            return Ok(GitCredentials::None);
        }
        if inner.golden.is_empty() {
            return next_reply(&mut inner.credentials);
        }
        next_reply(&mut inner.golden)
    }

    fn build_container(&self, job: &ValidationJob) -> Result<BuildReference, OperationError> {
        self.lock().build_calls += 1;
        self.builds.start_build(job)
    }

    fn build_status(&self, build: &BuildReference) -> Result<BuildReference, OperationError> {
        self.lock().status_calls += 1;
        self.builds.build_status(build)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbv_core::{CredentialKind, JobKey, JobSpec};

    fn job(golden: bool) -> ValidationJob {
        let mut spec = serde_json::json!({
            "notebook": {"git": {"url": "https://h/r.git"}, "path": "a.ipynb"},
            "podConfig": {"containerImage": "img"},
            "build": {"strategy": "tekton"}
        });
        if golden {
            spec["goldenNotebook"] = serde_json::json!({"git": {"url": "https://h/g.git"}, "path": "g.ipynb"});
        }
        let spec: JobSpec = serde_json::from_value(spec).unwrap();
        ValidationJob::new(JobKey::new("ml", "iris"), spec)
    }

    #[test]
    fn credential_replies_repeat_the_last_one() {
        let git = MockGitOperations::new();
        git.push_credentials(Err(OperationError::CredentialSourceUnavailable { source_name: "kubernetes".into(), message: "timeout".into() }));
        git.push_credentials(Ok(GitCredentials::Token { username: None, token: "t".into() }));
        assert!(git.resolve_credentials(&job(false)).is_err());
        assert_eq!(git.resolve_credentials(&job(false)).unwrap().kind(), CredentialKind::Token);
        assert_eq!(git.resolve_credentials(&job(false)).unwrap().kind(), CredentialKind::Token);
        assert_eq!(git.resolve_calls(), 3);
    }

    #[test]
    fn golden_credentials_fall_back_to_notebook_replies() {
        let git = MockGitOperations::new().with_credentials(GitCredentials::BasicAuth { username: "u".into(), password: "p".into() });
        assert_eq!(git.resolve_golden_credentials(&job(false)).unwrap(), GitCredentials::None);
        assert_eq!(git.resolve_golden_credentials(&job(true)).unwrap().kind(), CredentialKind::BasicAuth);
        assert_eq!(git.golden_calls(), 2);
    }

    #[test]
    fn builds_run_on_the_scripted_backend() {
        let git = MockGitOperations::new();
        let j = job(false);
        let build = git.build_container(&j).unwrap();
        assert_eq!(build.name, "iris-build-g1");
        assert_eq!(git.build_container(&j).unwrap().name, build.name);
        assert_eq!(git.backend(BuildStrategy::Tekton).creates(), 1);
        let done = git.build_status(&build).unwrap();
        assert!(done.image.is_some());
        assert_eq!((git.build_calls(), git.status_calls()), (2, 1));
    }
}
