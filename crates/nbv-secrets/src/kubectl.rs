use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use nbv_core::OperationError;
use nbv_kubectl::Kubectl;
use serde_json::Value;

use crate::source::{SecretData, SecretSource};

/// Native Kubernetes secrets, read with `kubectl get secret`.
#[derive(Clone)]
pub struct KubectlSecretSource {
    kubectl: Kubectl,
}

impl KubectlSecretSource {
    pub fn new(kubectl: Kubectl) -> Self {
        Self { kubectl }
    }

    fn unavailable(&self, message: String) -> OperationError {
        OperationError::CredentialSourceUnavailable { source_name: self.name().to_string(), message }
    }
}

impl SecretSource for KubectlSecretSource {
    fn name(&self) -> &str {
        "kubernetes"
    }

    fn lookup(&self, namespace: &str, reference: &str) -> Result<Option<SecretData>, OperationError> {
        let obj = self.kubectl.get("secret", namespace, reference).map_err(|e| self.unavailable(e.to_string()))?;
        obj.map(|o| decode_secret(reference, &o).map_err(|e| self.unavailable(e))).transpose()
    }
}

/// Decodes a Secret object; `data` values are base64, `stringData` values are plain.
pub fn decode_secret(name: &str, obj: &Value) -> Result<SecretData, String> {
    let mut data = BTreeMap::new();
    if let Some(map) = obj.get("data").and_then(Value::as_object) {
        for (key, value) in map {
            let encoded = value.as_str().unwrap_or_default();
            let bytes = STANDARD.decode(encoded.trim()).map_err(|e| format!("secret {name} key {key}: {e}"))?;
            data.insert(key.clone(), String::from_utf8_lossy(&bytes).to_string());
        }
    }
    if let Some(map) = obj.get("stringData").and_then(Value::as_object) {
        for (key, value) in map {
            data.insert(key.clone(), value.as_str().unwrap_or_default().to_string());
        }
    }
    let annotations = obj
        .pointer("/metadata/annotations")
        .and_then(Value::as_object)
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string())).collect())
        .unwrap_or_default();
    Ok(SecretData { name: name.to_string(), secret_type: obj.get("type").and_then(Value::as_str).map(str::to_string), annotations, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbv_kubectl::ScriptedRunner;
    use std::sync::Arc;

    #[test]
    fn decodes_kubernetes_secret() {
        let obj = serde_json::json!({
            "type": "kubernetes.io/basic-auth",
            "metadata": {"name": "git", "annotations": {"nbv.io/credential-type": "basic"}},
            "data": {"username": STANDARD.encode("bot"), "password": STANDARD.encode("pw")}
        });
        let s = decode_secret("git", &obj).unwrap();
        assert_eq!(s.value("username"), Some("bot"));
        assert_eq!(s.value("password"), Some("pw"));
        assert_eq!(s.secret_type.as_deref(), Some("kubernetes.io/basic-auth"));
        assert_eq!(s.annotations.get("nbv.io/credential-type").map(String::as_str), Some("basic"));
    }

    #[test]
    fn lookup_distinguishes_absent_from_unavailable() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .on("get secret present", &serde_json::json!({"data": {"token": STANDARD.encode("t")}}).to_string())
                .fail("get secret broken", "Unable to connect to the server")
                .fail("get secret absent", "Error from server (NotFound): secrets \"absent\" not found"),
        );
        let source = KubectlSecretSource::new(Kubectl::with_runner("kubectl", runner));
        assert_eq!(source.lookup("ml", "present").unwrap().unwrap().value("token"), Some("t"));
        assert!(source.lookup("ml", "absent").unwrap().is_none());
        assert!(matches!(source.lookup("ml", "broken"), Err(OperationError::CredentialSourceUnavailable { .. })));
    }
}
