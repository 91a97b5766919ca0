use std::collections::BTreeMap;

use nbv_core::{CredentialKind, GitCredentials, NotebookSource, ValidationJob, API_VERSION, KIND};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::pod::{LABEL_ATTEMPT, LABEL_GENERATION, LABEL_JOB, LABEL_SPEC_DIGEST, VALIDATOR_CONTAINER};

pub const DEFAULT_GIT_IMAGE: &str = "quay.io/takinosh/git-init-rhel9:latest";
pub const EXECUTOR_SCRIPT: &str = include_str!("../scripts/execute.sh");

const SSH_MOUNT: &str = "/etc/nbv/ssh";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Image for the clone init containers (needs bash, git and ssh).
    pub git_image: String,
    pub workspace_size_limit: Option<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { git_image: DEFAULT_GIT_IMAGE.to_string(), workspace_size_limit: None }
    }
}

/// Labels identifying the pods of one job; the dispatcher selects on these.
pub fn job_selector(job: &ValidationJob) -> BTreeMap<String, String> {
    BTreeMap::from([(LABEL_JOB.to_string(), job.metadata.name.clone())])
}

fn owner_references(job: &ValidationJob) -> Value {
    match &job.metadata.uid {
        Some(uid) => json!([{
            "apiVersion": API_VERSION,
            "kind": KIND,
            "name": job.metadata.name,
            "uid": uid.as_str(),
            "controller": true,
            "blockOwnerDeletion": true,
        }]),
        None => json!([]),
    }
}

/// Which clone a credential set belongs to; prefixes the secret keys and env vars.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Checkout {
    Notebook,
    Golden,
}

impl Checkout {
    fn prefix(self) -> &'static str {
        match self {
            Checkout::Notebook => "git",
            Checkout::Golden => "golden",
        }
    }

    fn target(self) -> &'static str {
        match self {
            Checkout::Notebook => "/workspace/repo",
            Checkout::Golden => "/workspace/golden",
        }
    }

    fn container(self) -> &'static str {
        match self {
            Checkout::Notebook => "git-clone",
            Checkout::Golden => "golden-clone",
        }
    }
}

fn secret_entries(checkout: Checkout, creds: &GitCredentials, data: &mut BTreeMap<String, String>) {
    let p = checkout.prefix();
    if let Some((user, secret)) = creds.https_pair() {
        data.insert(format!("{p}-username"), user.to_string());
        data.insert(format!("{p}-password"), secret.to_string());
    }
    if let GitCredentials::SshKey { private_key, known_hosts } = creds {
        data.insert(format!("{p}-ssh-privatekey"), private_key.clone());
        if let Some(hosts) = known_hosts {
            data.insert(format!("{p}-known-hosts"), hosts.clone());
        }
    }
}

/// Per-attempt Secret carrying clone credentials, owned by the job. `None` when both clones are anonymous.
pub fn credentials_secret_manifest(job: &ValidationJob, attempt: u32, creds: &GitCredentials, golden: &GitCredentials) -> Option<Value> {
    let mut data = BTreeMap::new();
    secret_entries(Checkout::Notebook, creds, &mut data);
    if job.spec.golden_notebook.is_some() {
        secret_entries(Checkout::Golden, golden, &mut data);
    }
    if data.is_empty() {
        return None;
    }
    Some(json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "type": "Opaque",
        "metadata": {
            "name": job.credentials_secret_name(attempt),
            "namespace": job.metadata.namespace,
            "labels": {LABEL_JOB: job.metadata.name, LABEL_ATTEMPT: attempt.to_string()},
            "ownerReferences": owner_references(job),
        },
        "stringData": data,
    }))
}

/// Shell for a clone init container. URL and ref arrive through env vars, secrets through
/// secretKeyRef env vars or the mounted key file; nothing secret appears in the script.
pub fn clone_script(kind: CredentialKind, target: &str) -> String {
    let clone = format!("git clone --depth 1 --branch \"$NBV_GIT_REF\" \"$NBV_GIT_URL\" {target}");
    match kind {
        CredentialKind::None => format!("set -eu\nexport GIT_TERMINAL_PROMPT=0\n{clone}\n"),
        CredentialKind::Token | CredentialKind::BasicAuth => format!(
            "set -eu\nexport GIT_TERMINAL_PROMPT=0\n\
             git config --global credential.helper '!f() {{ echo \"username=$NBV_GIT_USERNAME\"; echo \"password=$NBV_GIT_PASSWORD\"; }}; f'\n\
             {clone}\n"
        ),
        CredentialKind::SshKey => format!(
            "set -eu\nmkdir -p \"$HOME/.ssh\" && chmod 700 \"$HOME/.ssh\"\n\
             cp \"$NBV_SSH_KEY_FILE\" \"$HOME/.ssh/id_nbv\" && chmod 600 \"$HOME/.ssh/id_nbv\"\n\
             if [ -f \"$NBV_KNOWN_HOSTS_FILE\" ]; then HOSTS=\"-o UserKnownHostsFile=$NBV_KNOWN_HOSTS_FILE\"; \
             else HOSTS=\"-o StrictHostKeyChecking=accept-new -o UserKnownHostsFile=$HOME/.ssh/known_hosts\"; fi\n\
             export GIT_SSH_COMMAND=\"ssh -i $HOME/.ssh/id_nbv -o IdentitiesOnly=yes $HOSTS\"\n\
             {clone}\n\
             rm -f \"$HOME/.ssh/id_nbv\"\n"
        ),
    }
}

fn clone_container(job: &ValidationJob, attempt: u32, checkout: Checkout, source: &NotebookSource, creds: &GitCredentials, config: &ExecutorConfig) -> Value {
    let p = checkout.prefix();
    let secret = job.credentials_secret_name(attempt);
    let mut env = vec![
        json!({"name": "HOME", "value": "/tmp"}),
        json!({"name": "NBV_GIT_URL", "value": source.git.url}),
        json!({"name": "NBV_GIT_REF", "value": source.git.git_ref}),
    ];
    let mut mounts = vec![json!({"name": "workspace", "mountPath": "/workspace"})];
    match creds.kind() {
        CredentialKind::Token | CredentialKind::BasicAuth => {
            env.push(json!({"name": "NBV_GIT_USERNAME", "valueFrom": {"secretKeyRef": {"name": secret, "key": format!("{p}-username")}}}));
            env.push(json!({"name": "NBV_GIT_PASSWORD", "valueFrom": {"secretKeyRef": {"name": secret, "key": format!("{p}-password")}}}));
        }
        CredentialKind::SshKey => {
            env.push(json!({"name": "NBV_SSH_KEY_FILE", "value": format!("{SSH_MOUNT}/{p}-ssh-privatekey")}));
            env.push(json!({"name": "NBV_KNOWN_HOSTS_FILE", "value": format!("{SSH_MOUNT}/{p}-known-hosts")}));
            mounts.push(json!({"name": "git-ssh", "mountPath": SSH_MOUNT, "readOnly": true}));
        }
        CredentialKind::None => {}
    }
    json!({
        "name": checkout.container(),
        "image": config.git_image,
        "command": ["/bin/bash", "-c", clone_script(creds.kind(), checkout.target())],
        "env": env,
        "volumeMounts": mounts,
        "securityContext": {"allowPrivilegeEscalation": false, "runAsNonRoot": true, "capabilities": {"drop": ["ALL"]}},
    })
}

/// Full validation pod for one attempt.
pub fn pod_manifest(job: &ValidationJob, image: &str, attempt: u32, creds: &GitCredentials, golden: &GitCredentials, config: &ExecutorConfig) -> Value {
    let spec = &job.spec;
    let mut init = vec![clone_container(job, attempt, Checkout::Notebook, &spec.notebook, creds, config)];
    let mut env = vec![
        json!({"name": "HOME", "value": "/workspace"}),
        json!({"name": "NBV_NOTEBOOK_PATH", "value": format!("/workspace/repo/{}", spec.notebook.path)}),
    ];
    if let Some(golden_source) = &spec.golden_notebook {
        init.push(clone_container(job, attempt, Checkout::Golden, golden_source, golden, config));
        env.push(json!({"name": "NBV_GOLDEN_PATH", "value": format!("/workspace/golden/{}", golden_source.path)}));
    }
    env.extend(spec.pod_config.env.iter().map(|e| json!({"name": e.name, "value": e.value})));

    let mut volumes = vec![match &config.workspace_size_limit {
        Some(limit) => json!({"name": "workspace", "emptyDir": {"sizeLimit": limit}}),
        None => json!({"name": "workspace", "emptyDir": {}}),
    }];
    let uses_ssh = creds.kind() == CredentialKind::SshKey || (spec.golden_notebook.is_some() && golden.kind() == CredentialKind::SshKey);
    if uses_ssh {
        volumes.push(json!({"name": "git-ssh", "secret": {"secretName": job.credentials_secret_name(attempt), "defaultMode": 0o400}}));
    }

    let mut pod_spec = json!({
        "restartPolicy": "Never",
        "initContainers": init,
        "containers": [{
            "name": VALIDATOR_CONTAINER,
            "image": image,
            "command": ["/bin/bash", "-c", EXECUTOR_SCRIPT],
            "workingDir": "/workspace",
            "env": env,
            "resources": spec.pod_config.resources,
            "volumeMounts": [{"name": "workspace", "mountPath": "/workspace"}],
            "securityContext": {"allowPrivilegeEscalation": false, "runAsNonRoot": true, "capabilities": {"drop": ["ALL"]}},
        }],
        "volumes": volumes,
    });
    if let Some(sa) = &spec.pod_config.service_account_name {
        pod_spec["serviceAccountName"] = json!(sa);
    }
    if let Some(timeout) = spec.timeout_seconds {
        pod_spec["activeDeadlineSeconds"] = json!(timeout);
    }

    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": job.pod_name(attempt),
            "namespace": job.metadata.namespace,
            "labels": {
                LABEL_JOB: job.metadata.name,
                LABEL_GENERATION: job.generation().to_string(),
                LABEL_ATTEMPT: attempt.to_string(),
                LABEL_SPEC_DIGEST: spec.digest(),
            },
            "ownerReferences": owner_references(job),
        },
        "spec": pod_spec,
    })
}
