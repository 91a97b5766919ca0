use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use nbv_core::ReconcilePolicy;
use nbv_exec::ExecutorConfig;

pub const CONFIG_FILE: &str = "nbv.toml";

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub controller: ControllerConfig,
    pub policy: ReconcilePolicy,
    pub executor: ExecutorConfig,
    pub secrets: SecretsConfig,
    pub builds: BuildsConfig,
    pub serving: ServingConfig,
    pub local: LocalConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    /// Namespace to watch; every namespace when unset.
    pub namespace: Option<String>,
    pub workers: usize,
    /// How often every job is re-listed and queued, in seconds.
    pub resync_secs: u64,
    pub kubectl: String,
    pub context: Option<String>,
    pub request_timeout: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self { namespace: None, workers: 4, resync_secs: 300, kubectl: "kubectl".into(), context: None, request_timeout: Some("30s".into()) }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SecretsConfig {
    /// Lookup order; known sources are `kubernetes` and `vault`.
    pub sources: Vec<String>,
    pub vault_address: Option<String>,
    pub vault_mount: String,
    pub vault_prefix: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self { sources: vec!["kubernetes".into()], vault_address: None, vault_mount: "secret".into(), vault_prefix: "nbv".into() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuildsConfig {
    /// OpenShift CLI used for S2I builds.
    pub oc: String,
    pub strategies: Vec<String>,
}

impl Default for BuildsConfig {
    fn default() -> Self {
        Self { oc: "oc".into(), strategies: vec!["s2i".into(), "tekton".into()] }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServingConfig {
    pub timeout_secs: u64,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LocalConfig {
    pub db_path: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self { db_path: "~/.nbv/jobs.db".into() }
    }
}

impl Config {
    pub fn default_config() -> Self {
        Self::default()
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
        Ok(cfg)
    }

    /// Loads `path` when it exists, otherwise the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default_config())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn config_path(dir: &Path) -> PathBuf {
        dir.join(CONFIG_FILE)
    }

    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.local.db_path).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = Config::config_path(dir.path());
        let mut cfg = Config::default_config();
        cfg.controller.namespace = Some("ml".into());
        cfg.secrets.sources = vec!["vault".into(), "kubernetes".into()];
        cfg.policy.max_retries_per_phase = 5;
        cfg.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nbv.toml");
        std::fs::write(&path, "[policy]\npod_retention_secs = 60\n\n[controller]\nworkers = 2\n").unwrap();
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.policy.pod_retention_secs, 60);
        assert_eq!(cfg.policy.max_retries_per_phase, 3);
        assert_eq!(cfg.controller.workers, 2);
        assert_eq!(cfg.controller.kubectl, "kubectl");
        assert_eq!(cfg.secrets.sources, vec!["kubernetes".to_string()]);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, Config::default_config());
    }

    #[test]
    fn db_path_expands_home() {
        let mut cfg = Config::default_config();
        cfg.local.db_path = "/var/lib/nbv/jobs.db".into();
        assert_eq!(cfg.db_path(), PathBuf::from("/var/lib/nbv/jobs.db"));
        cfg.local.db_path = "~/jobs.db".into();
        assert!(!cfg.db_path().to_string_lossy().starts_with('~'));
    }
}
