use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use nbv_build::{BackendRegistry, BuildOrchestrator, S2iBackend, TektonBackend};
use nbv_eval::HttpServingClient;
use nbv_exec::KubectlPodApi;
use nbv_kubectl::Kubectl;
use nbv_logs::KubectlLogOperations;
use nbv_secrets::{CredentialResolver, KubectlSecretSource, SecretSource, VaultSecretSource};
use nbv_store::{JobStore, KubectlJobStore};

use crate::config::Config;
use crate::git_ops::ClusterGitOperations;
use crate::reconciler::{Operations, Reconciler};

fn kubectl(cfg: &Config, program: &str) -> Kubectl {
    Kubectl::new(program).context(cfg.controller.context.clone()).request_timeout(cfg.controller.request_timeout.clone())
}

pub fn secret_sources(cfg: &Config) -> Result<Vec<Arc<dyn SecretSource>>> {
    let mut sources: Vec<Arc<dyn SecretSource>> = Vec::new();
    for name in &cfg.secrets.sources {
        match name.trim().to_ascii_lowercase().as_str() {
            "kubernetes" | "k8s" => sources.push(Arc::new(KubectlSecretSource::new(kubectl(cfg, &cfg.controller.kubectl)))),
            "vault" => sources.push(Arc::new(VaultSecretSource::new(
                cfg.secrets.vault_address.clone(),
                cfg.secrets.vault_mount.clone(),
                cfg.secrets.vault_prefix.clone(),
            ))),
            other => bail!("unknown secret source '{other}' in secrets.sources (expected kubernetes or vault)"),
        }
    }
    if sources.is_empty() {
        bail!("secrets.sources is empty");
    }
    Ok(sources)
}

pub fn build_registry(cfg: &Config) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    for name in &cfg.builds.strategies {
        registry = match name.trim().to_ascii_lowercase().as_str() {
            "s2i" => registry.register(Arc::new(S2iBackend::new(kubectl(cfg, &cfg.builds.oc)))),
            "tekton" => registry.register(Arc::new(TektonBackend::new(kubectl(cfg, &cfg.controller.kubectl)))),
            other => bail!("unknown build strategy '{other}' in builds.strategies (expected s2i or tekton)"),
        };
    }
    Ok(registry)
}

/// Production operation interfaces, all talking to the cluster through the CLIs.
pub fn cluster_operations(cfg: &Config) -> Result<Operations> {
    let resolver = CredentialResolver::new(secret_sources(cfg)?);
    let builds = BuildOrchestrator::new(build_registry(cfg)?);
    let k = kubectl(cfg, &cfg.controller.kubectl);
    Ok(Operations {
        git: Arc::new(ClusterGitOperations::new(resolver, builds)),
        pods: Arc::new(KubectlPodApi::new(k.clone())),
        logs: Arc::new(KubectlLogOperations::new(k)),
        serving: Arc::new(HttpServingClient::new(Duration::from_secs(cfg.serving.timeout_secs))),
    })
}

pub fn cluster_store(cfg: &Config) -> Arc<dyn JobStore> {
    Arc::new(KubectlJobStore::new(kubectl(cfg, &cfg.controller.kubectl)))
}

pub fn cluster_reconciler(cfg: &Config, store: Arc<dyn JobStore>) -> Result<Reconciler> {
    Ok(Reconciler::new(store, cluster_operations(cfg)?, cfg.policy.clone(), cfg.executor.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_follow_configured_order() {
        let mut cfg = Config::default_config();
        cfg.secrets.sources = vec!["vault".into(), "Kubernetes".into()];
        let names: Vec<String> = secret_sources(&cfg).unwrap().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names[1], "kubernetes");
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn unknown_names_are_config_errors() {
        let mut cfg = Config::default_config();
        cfg.secrets.sources = vec!["consul".into()];
        assert!(secret_sources(&cfg).err().unwrap().to_string().contains("consul"));

        let mut cfg = Config::default_config();
        cfg.builds.strategies = vec!["kaniko".into()];
        assert!(build_registry(&cfg).is_err());
    }

    #[test]
    fn default_registry_has_both_strategies() {
        let registry = build_registry(&Config::default_config()).unwrap();
        assert_eq!(registry.names(), vec!["s2i", "tekton"]);
    }
}
