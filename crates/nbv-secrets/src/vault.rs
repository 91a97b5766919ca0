use std::sync::Arc;

use nbv_core::OperationError;
use nbv_kubectl::{ProcessRunner, Runner};
use serde_json::Value;

use crate::source::{SecretData, SecretSource};

/// External secret manager: HashiCorp Vault KV v2, read through the `vault` CLI.
///
/// A reference `git-creds` in namespace `ml` maps to `<mount>/<prefix>/ml/git-creds`.
#[derive(Clone)]
pub struct VaultSecretSource {
    runner: Arc<dyn Runner>,
    address: Option<String>,
    mount: String,
    prefix: String,
}

impl VaultSecretSource {
    pub fn new(address: Option<String>, mount: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::with_runner(Arc::new(ProcessRunner), address, mount, prefix)
    }

    pub fn with_runner(runner: Arc<dyn Runner>, address: Option<String>, mount: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self { runner, address, mount: mount.into(), prefix: prefix.into() }
    }

    pub fn path_for(&self, namespace: &str, reference: &str) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{namespace}/{reference}")
        } else {
            format!("{prefix}/{namespace}/{reference}")
        }
    }
}

impl SecretSource for VaultSecretSource {
    fn name(&self) -> &str {
        "vault"
    }

    fn lookup(&self, namespace: &str, reference: &str) -> Result<Option<SecretData>, OperationError> {
        let mut args = vec!["kv".to_string(), "get".to_string(), "-format=json".to_string(), format!("-mount={}", self.mount)];
        if let Some(addr) = &self.address {
            args.push(format!("-address={addr}"));
        }
        args.push(self.path_for(namespace, reference));

        let unavailable = |message: String| OperationError::CredentialSourceUnavailable { source_name: "vault".into(), message };
        let out = match self.runner.run("vault", &args, None) {
            Ok(out) => out,
            Err(e) if e.to_string().contains("No value found") => return Ok(None),
            Err(e) => return Err(unavailable(e.to_string())),
        };
        let doc: Value = serde_json::from_str(&out).map_err(|e| unavailable(format!("decoding vault response: {e}")))?;
        let fields = doc.pointer("/data/data").or_else(|| doc.get("data")).and_then(Value::as_object);
        let Some(fields) = fields else {
            return Ok(None);
        };

        let mut secret = SecretData::new(reference);
        for (key, value) in fields {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if key == crate::source::CREDENTIAL_TYPE_ANNOTATION {
                secret.annotations.insert(key.clone(), text);
            } else {
                secret.data.insert(key.clone(), text);
            }
        }
        Ok(Some(secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbv_kubectl::ScriptedRunner;

    #[test]
    fn reads_kv_v2_document() {
        let runner = Arc::new(ScriptedRunner::new().on(
            "kv get",
            r#"{"data":{"data":{"username":"bot","token":"s.abc","nbv.io/credential-type":"token"},"metadata":{"version":3}}}"#,
        ));
        let vault = VaultSecretSource::with_runner(runner.clone(), Some("https://vault:8200".into()), "secret", "nbv");
        let s = vault.lookup("ml", "git").unwrap().unwrap();
        assert_eq!(s.value("token"), Some("s.abc"));
        assert!(s.annotations.contains_key("nbv.io/credential-type"));
        let line = runner.calls()[0].line();
        assert!(line.ends_with("nbv/ml/git") && line.contains("-mount=secret"), "{line}");
    }

    #[test]
    fn missing_path_is_absent() {
        let runner = Arc::new(ScriptedRunner::new().fail("kv get", "No value found at secret/data/nbv/ml/git"));
        let vault = VaultSecretSource::with_runner(runner, None, "secret", "nbv");
        assert!(vault.lookup("ml", "git").unwrap().is_none());
    }

    #[test]
    fn sealed_vault_is_unavailable() {
        let runner = Arc::new(ScriptedRunner::new().fail("kv get", "Error making API request. Code: 503. * Vault is sealed"));
        let vault = VaultSecretSource::with_runner(runner, None, "secret", "");
        assert!(matches!(vault.lookup("ml", "git"), Err(OperationError::CredentialSourceUnavailable { .. })));
        assert_eq!(vault.path_for("ml", "git"), "ml/git");
    }
}
