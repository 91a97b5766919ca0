use anyhow::{anyhow, Result};
use nbv_core::{BuildPhase, ValidationJob};

use crate::backend::BuildBackend;

/// Shared backend contract: a build is found by its deterministic name once created, a repeated
/// start through the orchestrator reuses it, and polling keeps identity and generation.
pub fn run_build_contract_suite(backend: &dyn BuildBackend, job: &ValidationJob) -> Result<()> {
    let name = job.build_name();
    let ns = &job.metadata.namespace;

    if backend.find_build(ns, &name)?.is_some() {
        return Err(anyhow!("fixture must start without a build named {name}"));
    }

    let created = backend.create_build(job, &name)?;
    if created.name != name || created.generation != job.generation() {
        return Err(anyhow!("created build {created:?} does not carry the deterministic identity {name}/g{}", job.generation()));
    }
    if created.strategy != backend.strategy() {
        return Err(anyhow!("created build reports strategy {} from a {} backend", created.strategy, backend.strategy()));
    }

    let found = backend.find_build(ns, &name)?.ok_or_else(|| anyhow!("build {name} not found after creation"))?;
    if found.name != created.name {
        return Err(anyhow!("find_build returned {} for {name}", found.name));
    }

    let polled = backend.build_status(&created)?;
    if polled.name != name || polled.generation != job.generation() {
        return Err(anyhow!("polling changed build identity: {polled:?}"));
    }
    if polled.phase == BuildPhase::Succeeded && polled.image.is_none() {
        return Err(anyhow!("succeeded build {name} carries no image"));
    }
    Ok(())
}
