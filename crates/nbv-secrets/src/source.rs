use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use nbv_core::{CredentialKind, OperationError};

pub const SSH_AUTH_TYPE: &str = "kubernetes.io/ssh-auth";
pub const BASIC_AUTH_TYPE: &str = "kubernetes.io/basic-auth";
pub const CREDENTIAL_TYPE_ANNOTATION: &str = "nbv.io/credential-type";

/// A secret as read from any source, values already decoded.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SecretData {
    pub name: String,
    /// Kubernetes `type` field (`Opaque`, `kubernetes.io/ssh-auth`, ...).
    pub secret_type: Option<String>,
    pub annotations: BTreeMap<String, String>,
    pub data: BTreeMap<String, String>,
}

impl SecretData {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.data.insert(key.to_string(), value.to_string());
        self
    }

    pub fn typed(mut self, secret_type: &str) -> Self {
        self.secret_type = Some(secret_type.to_string());
        self
    }

    pub fn annotated(mut self, key: &str, value: &str) -> Self {
        self.annotations.insert(key.to_string(), value.to_string());
        self
    }

    /// Non-empty value of a data key.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str).filter(|v| !v.trim().is_empty())
    }

    /// Credential kind the secret declares, from the annotation first and then its type.
    pub fn declared_kind(&self) -> Result<Option<CredentialKind>, String> {
        if let Some(declared) = self.annotations.get(CREDENTIAL_TYPE_ANNOTATION).or_else(|| self.data.get(CREDENTIAL_TYPE_ANNOTATION)) {
            return match declared.trim() {
                "ssh" | "ssh-key" => Ok(Some(CredentialKind::SshKey)),
                "basic" | "basic-auth" => Ok(Some(CredentialKind::BasicAuth)),
                "token" => Ok(Some(CredentialKind::Token)),
                other => Err(format!("unknown {CREDENTIAL_TYPE_ANNOTATION} '{other}'")),
            };
        }
        Ok(match self.secret_type.as_deref() {
            Some(SSH_AUTH_TYPE) => Some(CredentialKind::SshKey),
            Some(BASIC_AUTH_TYPE) => Some(CredentialKind::BasicAuth),
            _ => None,
        })
    }
}

/// Somewhere Git credentials may live.
///
/// `Ok(None)` means the source is reachable and does not hold the reference; errors are
/// reserved for an unreachable source (`CredentialSourceUnavailable`).
pub trait SecretSource: Send + Sync {
    fn name(&self) -> &str;

    fn lookup(&self, namespace: &str, reference: &str) -> Result<Option<SecretData>, OperationError>;
}

/// Test source with call counting and a switch to simulate an outage.
#[derive(Default)]
pub struct InMemorySecretSource {
    name: String,
    secrets: Mutex<HashMap<(String, String), SecretData>>,
    unavailable: AtomicBool,
    lookups: AtomicUsize,
}

impl InMemorySecretSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn insert(&self, namespace: &str, secret: SecretData) {
        if let Ok(mut map) = self.secrets.lock() {
            map.insert((namespace.to_string(), secret.name.clone()), secret);
        }
    }

    pub fn with_secret(self, namespace: &str, secret: SecretData) -> Self {
        self.insert(namespace, secret);
        self
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl SecretSource for InMemorySecretSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, namespace: &str, reference: &str) -> Result<Option<SecretData>, OperationError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(OperationError::CredentialSourceUnavailable { source_name: self.name.clone(), message: "simulated outage".into() });
        }
        let map = self
            .secrets
            .lock()
            .map_err(|_| OperationError::CredentialSourceUnavailable { source_name: self.name.clone(), message: "lock poisoned".into() })?;
        Ok(map.get(&(namespace.to_string(), reference.to_string())).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_kind_prefers_annotation() {
        let s = SecretData::new("s").typed(BASIC_AUTH_TYPE).annotated(CREDENTIAL_TYPE_ANNOTATION, "token");
        assert_eq!(s.declared_kind().unwrap(), Some(CredentialKind::Token));
        assert_eq!(SecretData::new("s").typed(SSH_AUTH_TYPE).declared_kind().unwrap(), Some(CredentialKind::SshKey));
        assert_eq!(SecretData::new("s").typed("Opaque").declared_kind().unwrap(), None);
        assert!(SecretData::new("s").annotated(CREDENTIAL_TYPE_ANNOTATION, "kerberos").declared_kind().is_err());
    }

    #[test]
    fn blank_values_count_as_missing() {
        let s = SecretData::new("s").with("token", "  ");
        assert_eq!(s.value("token"), None);
    }
}
