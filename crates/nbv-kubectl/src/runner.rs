use std::collections::VecDeque;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KubectlError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("command failed: {program} {args}\nstdout:{stdout}\nstderr:{stderr}")]
    Failed { program: String, args: String, code: Option<i32>, stdout: String, stderr: String },
    #[error("unexpected output from {program}: {message}")]
    Decode { program: String, message: String },
}

impl KubectlError {
    fn stderr(&self) -> &str {
        match self {
            KubectlError::Failed { stderr, .. } => stderr,
            _ => "",
        }
    }

    pub fn is_not_found(&self) -> bool {
        let e = self.stderr();
        e.contains("NotFound") || e.contains("not found")
    }

    pub fn is_already_exists(&self) -> bool {
        self.stderr().contains("AlreadyExists") || self.stderr().contains("already exists")
    }

    pub fn is_forbidden(&self) -> bool {
        self.stderr().contains("Forbidden") || self.stderr().contains("forbidden")
    }

    pub fn is_invalid(&self) -> bool {
        let e = self.stderr();
        e.contains("Invalid value") || e.contains("is invalid") || e.contains("BadRequest")
    }

    pub fn is_quota_exceeded(&self) -> bool {
        self.stderr().contains("exceeded quota")
    }

    /// Failures worth retrying: API server unreachable, throttled or overloaded.
    pub fn is_transient(&self) -> bool {
        match self {
            KubectlError::Spawn { .. } => true,
            KubectlError::Decode { .. } => false,
            KubectlError::Failed { stderr, .. } => [
                "Unable to connect",
                "connection refused",
                "i/o timeout",
                "TLS handshake timeout",
                "ServiceUnavailable",
                "TooManyRequests",
                "InternalError",
                "the server is currently unable",
                "context deadline exceeded",
                "etcdserver",
            ]
            .iter()
            .any(|needle| stderr.contains(needle)),
        }
    }
}

/// Executes one CLI invocation. Stdout is returned trimmed of trailing whitespace.
pub trait Runner: Send + Sync {
    fn run(&self, program: &str, args: &[String], stdin: Option<&[u8]>) -> Result<String, KubectlError>;
}

#[derive(Clone, Debug, Default)]
pub struct ProcessRunner;

impl Runner for ProcessRunner {
    fn run(&self, program: &str, args: &[String], stdin: Option<&[u8]>) -> Result<String, KubectlError> {
        let spawn_err = |source| KubectlError::Spawn { program: program.to_string(), source };
        let mut cmd = Command::new(program);
        cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() });

        let mut child = cmd.spawn().map_err(spawn_err)?;
        if let (Some(bytes), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(bytes).map_err(spawn_err)?;
        }
        let out = child.wait_with_output().map_err(spawn_err)?;
        if !out.status.success() {
            return Err(KubectlError::Failed {
                program: program.to_string(),
                args: args.join(" "),
                code: out.status.code(),
                stdout: String::from_utf8_lossy(&out.stdout).to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim_end().to_string())
    }
}

/// One recorded invocation of a `ScriptedRunner`.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl Invocation {
    pub fn line(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }
}

type Reply = Result<String, (Option<i32>, String)>;

/// Deterministic runner for adapter tests. Replies are matched by substring of the command
/// line, first match wins, and a rule is consumed when it has a bounded count.
#[derive(Default)]
pub struct ScriptedRunner {
    inner: Mutex<ScriptedInner>,
}

#[derive(Default)]
struct ScriptedInner {
    rules: Vec<(String, VecDeque<Reply>, bool)>,
    calls: Vec<Invocation>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer commands containing `pattern` with `stdout`.
    pub fn on(self, pattern: &str, stdout: &str) -> Self {
        self.push(pattern, Ok(stdout.to_string()), true)
    }

    /// Answer the next matching command with `stdout`, then fall through to later rules.
    pub fn once(self, pattern: &str, stdout: &str) -> Self {
        self.push(pattern, Ok(stdout.to_string()), false)
    }

    /// Always fail commands containing `pattern` with the given stderr.
    pub fn fail(self, pattern: &str, stderr: &str) -> Self {
        self.push(pattern, Err((Some(1), stderr.to_string())), true)
    }

    pub fn fail_once(self, pattern: &str, stderr: &str) -> Self {
        self.push(pattern, Err((Some(1), stderr.to_string())), false)
    }

    fn push(self, pattern: &str, reply: Reply, sticky: bool) -> Self {
        if let Ok(mut inner) = self.inner.lock() {
            inner.rules.push((pattern.to_string(), VecDeque::from([reply]), sticky));
        }
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.inner.lock().map(|i| i.calls.clone()).unwrap_or_default()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.calls().iter().filter(|c| c.line().contains(pattern)).count()
    }
}

impl Runner for ScriptedRunner {
    fn run(&self, program: &str, args: &[String], stdin: Option<&[u8]>) -> Result<String, KubectlError> {
        let mut inner = self.inner.lock().map_err(|_| KubectlError::Decode { program: program.to_string(), message: "runner lock poisoned".into() })?;
        let call = Invocation { program: program.to_string(), args: args.to_vec(), stdin: stdin.map(|b| String::from_utf8_lossy(b).to_string()) };
        let line = call.line();
        inner.calls.push(call);

        let idx = inner.rules.iter().position(|(pattern, replies, _)| line.contains(pattern.as_str()) && !replies.is_empty());
        let reply = match idx {
            Some(i) => {
                let (_, replies, sticky) = &mut inner.rules[i];
                if *sticky {
                    replies.front().cloned()
                } else {
                    replies.pop_front()
                }
            }
            None => None,
        };
        match reply {
            Some(Ok(stdout)) => Ok(stdout),
            Some(Err((code, stderr))) => Err(KubectlError::Failed { program: program.to_string(), args: args.join(" "), code, stdout: String::new(), stderr }),
            None => Err(KubectlError::Failed {
                program: program.to_string(),
                args: args.join(" "),
                code: Some(1),
                stdout: String::new(),
                stderr: format!("Error from server (NotFound): no scripted reply for '{line}'"),
            }),
        }
    }
}
