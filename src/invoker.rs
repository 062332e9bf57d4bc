//! Headless assistant invocation - subprocess wrapper
//!
//! Runs the assistant executable non-interactively, feeding it one
//! prompt and reading back one structured result envelope. The
//! subprocess is a black box; nothing it does internally is inspected
//! or restricted here.

use std::env;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::InvokeError;
use crate::types::{ContinuationToken, InvocationResult, SessionDirective};

/// Name of the assistant executable searched for on PATH
const ASSISTANT_BIN: &str = "claude";

/// Capability interface for running one invocation.
///
/// The coordinator only depends on this trait; swapping the subprocess
/// for a linked library or a remote service needs no change above it.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Run one invocation and return its parsed result.
    ///
    /// Expected failures (timeout, non-zero exit, bad output) come back
    /// as tagged `InvokeError` variants; only setup problems are fatal.
    async fn invoke(
        &self,
        prompt: &str,
        session: &SessionDirective,
    ) -> Result<InvocationResult, InvokeError>;
}

/// Invoker that shells out to the assistant CLI in headless mode.
pub struct HeadlessInvoker {
    config: EngineConfig,
}

impl HeadlessInvoker {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Resolve the assistant executable: explicit config path first,
    /// then PATH, then common global install locations.
    fn find_executable(&self) -> Result<PathBuf, InvokeError> {
        if let Some(path) = &self.config.executable {
            return Ok(path.clone());
        }

        if let Some(paths) = env::var_os("PATH") {
            for dir in env::split_paths(&paths) {
                let candidate = dir.join(ASSISTANT_BIN);
                if candidate.is_file() {
                    debug!(path = %candidate.display(), "Found assistant executable on PATH");
                    return Ok(candidate);
                }
            }
        }

        let mut candidates = vec![PathBuf::from("/usr/local/bin").join(ASSISTANT_BIN)];
        if let Some(home) = env::var_os("HOME") {
            let home = PathBuf::from(home);
            candidates.push(home.join(".npm-global/bin").join(ASSISTANT_BIN));
            candidates.push(home.join(".local/bin").join(ASSISTANT_BIN));
        }
        for candidate in candidates {
            if candidate.is_file() {
                debug!(path = %candidate.display(), "Found assistant executable");
                return Ok(candidate);
            }
        }

        Err(InvokeError::Setup(format!(
            "assistant executable {ASSISTANT_BIN:?} not found on PATH or in common install locations"
        )))
    }

    /// Build the argument list for one invocation.
    ///
    /// Fresh sessions bind a pre-allocated identifier via `--session-id`;
    /// resumes pass the continuation token via `--resume`. Never both.
    fn build_args(&self, prompt: &str, session: &SessionDirective) -> Vec<String> {
        let mut args = vec![
            "--print".to_string(),
            "--output-format".to_string(),
            "json".to_string(),
        ];

        if let Some(model) = &self.config.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        match session {
            SessionDirective::Fresh(token) => {
                args.push("--session-id".to_string());
                args.push(token.as_str().to_string());
            }
            SessionDirective::Resume(token) => {
                args.push("--resume".to_string());
                args.push(token.as_str().to_string());
            }
        }

        args.push("--".to_string());
        args.push(prompt.to_string());
        args
    }
}

#[async_trait]
impl Invoker for HeadlessInvoker {
    async fn invoke(
        &self,
        prompt: &str,
        session: &SessionDirective,
    ) -> Result<InvocationResult, InvokeError> {
        let executable = self.find_executable()?;
        let args = self.build_args(prompt, session);

        info!(
            session = %session.token(),
            resume = session.is_resume(),
            workspace = %self.config.workspace.display(),
            "Invoking headless assistant"
        );

        // kill_on_drop covers both the timeout branch below and caller
        // cancellation: dropping the wait future kills the child.
        let child = Command::new(&executable)
            .args(&args)
            .current_dir(&self.config.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                InvokeError::Setup(format!(
                    "failed to execute assistant at {}: {e}",
                    executable.display()
                ))
            })?;

        let output = match tokio::time::timeout(
            self.config.invoke_timeout,
            child.wait_with_output(),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    session = %session.token(),
                    timeout_secs = self.config.invoke_timeout.as_secs(),
                    "Assistant invocation timed out, subprocess killed"
                );
                return Err(InvokeError::Timeout {
                    seconds: self.config.invoke_timeout.as_secs(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !stderr.trim().is_empty() {
            warn!(stderr = %stderr.chars().take(500).collect::<String>(), "Assistant stderr");
        }

        if !output.status.success() {
            // A parseable envelope wins over the exit status; the
            // subprocess reports its own errors inside the envelope.
            if let Ok(result) = parse_envelope(&stdout, session.token()) {
                return Ok(result);
            }
            let code = output.status.code().unwrap_or(-1);
            let detail = if stderr.trim().is_empty() {
                "unknown error".to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(InvokeError::ProcessFailure {
                code,
                stderr: detail,
            });
        }

        debug!(stdout_len = stdout.len(), "Assistant invocation completed");
        parse_envelope(&stdout, session.token())
    }
}

/// Result envelope emitted by the assistant CLI in JSON output mode.
#[derive(Debug, Deserialize)]
struct ResultEnvelope {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    is_error: bool,
}

/// Parse the subprocess's structured output.
///
/// The envelope's `session_id` becomes the continuation token; when the
/// subprocess omits it, the token the invocation ran under is kept so a
/// later resume still targets the right session.
fn parse_envelope(
    raw: &str,
    fallback: &ContinuationToken,
) -> Result<InvocationResult, InvokeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(InvokeError::MalformedOutput(
            "subprocess produced no output".to_string(),
        ));
    }

    let envelope: ResultEnvelope = serde_json::from_str(trimmed).map_err(|e| {
        let snippet: String = trimmed.chars().take(200).collect();
        InvokeError::MalformedOutput(format!("invalid result envelope ({e}): {snippet}"))
    })?;

    let response = envelope.result.ok_or_else(|| {
        InvokeError::MalformedOutput("result envelope missing `result` field".to_string())
    })?;

    let token = envelope
        .session_id
        .map(ContinuationToken::new)
        .unwrap_or_else(|| fallback.clone());

    Ok(InvocationResult {
        response,
        token: Some(token),
        reported_error: envelope.is_error,
    })
}
