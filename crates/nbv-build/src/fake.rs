use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use nbv_core::{BuildPhase, BuildReference, BuildStrategy, OperationError, ValidationJob};

use crate::backend::{output_image, pending_reference, BuildBackend};

/// Scripted backend for tests. Status polls consume scripted phases, then report success.
pub struct FakeBuildBackend {
    strategy: BuildStrategy,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    builds: HashMap<(String, String), (BuildReference, String)>,
    phases: VecDeque<Result<BuildPhase, OperationError>>,
    create_errors: VecDeque<OperationError>,
    creates: usize,
    polls: usize,
}

impl FakeBuildBackend {
    pub fn new(strategy: BuildStrategy) -> Self {
        Self { strategy, inner: Mutex::new(Inner::default()) }
    }

    pub fn script_phase(&self, phase: BuildPhase) {
        self.lock().phases.push_back(Ok(phase));
    }

    pub fn fail_next_status(&self, err: OperationError) {
        self.lock().phases.push_back(Err(err));
    }

    pub fn fail_next_create(&self, err: OperationError) {
        self.lock().create_errors.push_back(err);
    }

    pub fn creates(&self) -> usize {
        self.lock().creates
    }

    pub fn polls(&self) -> usize {
        self.lock().polls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BuildBackend for FakeBuildBackend {
    fn strategy(&self) -> BuildStrategy {
        self.strategy
    }

    fn find_build(&self, namespace: &str, name: &str) -> Result<Option<BuildReference>, OperationError> {
        Ok(self.lock().builds.get(&(namespace.to_string(), name.to_string())).map(|(b, _)| b.clone()))
    }

    fn create_build(&self, job: &ValidationJob, name: &str) -> Result<BuildReference, OperationError> {
        let mut inner = self.lock();
        if let Some(err) = inner.create_errors.pop_front() {
            return Err(err);
        }
        inner.creates += 1;
        let build = pending_reference(job, name, self.strategy);
        inner.builds.insert((build.namespace.clone(), name.to_string()), (build.clone(), output_image(job)));
        Ok(build)
    }

    fn build_status(&self, build: &BuildReference) -> Result<BuildReference, OperationError> {
        let mut inner = self.lock();
        inner.polls += 1;
        let key = (build.namespace.clone(), build.name.clone());
        let image = match inner.builds.get(&key) {
            Some((_, image)) => image.clone(),
            None => return Err(OperationError::BuildFailed { build: build.name.clone(), message: "build not found".into() }),
        };
        let phase = inner.phases.pop_front().unwrap_or(Ok(BuildPhase::Succeeded))?;
        let mut current = build.clone();
        current.phase = phase;
        current.image = (phase == BuildPhase::Succeeded).then_some(image);
        current.message = (phase == BuildPhase::Failed).then(|| "scripted failure".to_string());
        if let Some(entry) = inner.builds.get_mut(&key) {
            entry.0 = current.clone();
        }
        Ok(current)
    }
}
