//! Engine configuration

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::SeanceError;

/// Default wall-clock limit for one subprocess invocation (5 minutes)
pub const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_secs(300);

/// Default bound on waiting for per-key exclusivity before reporting busy
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(30);

/// Configuration for the invocation engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Explicit path to the assistant executable; when None the invoker
    /// searches PATH and common install locations
    pub executable: Option<PathBuf>,
    /// Working directory the subprocess runs in
    pub workspace: PathBuf,
    /// Hard wall-clock timeout per invocation
    pub invoke_timeout: Duration,
    /// Bounded wait for per-key exclusivity before surfacing Busy
    pub lock_wait: Duration,
    /// Optional model override passed through to the subprocess
    pub model: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            executable: None,
            workspace: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            invoke_timeout: DEFAULT_INVOKE_TIMEOUT,
            lock_wait: DEFAULT_LOCK_WAIT,
            model: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    ///
    /// Recognized variables: `SEANCE_EXECUTABLE`, `SEANCE_WORKSPACE`,
    /// `SEANCE_TIMEOUT_SECS`, `SEANCE_LOCK_WAIT_SECS`, `SEANCE_MODEL`.
    pub fn from_env() -> Result<Self, SeanceError> {
        let mut config = Self::default();

        if let Ok(path) = env::var("SEANCE_EXECUTABLE") {
            config.executable = Some(PathBuf::from(path));
        }
        if let Ok(dir) = env::var("SEANCE_WORKSPACE") {
            config.workspace = PathBuf::from(dir);
        }
        if let Ok(secs) = env::var("SEANCE_TIMEOUT_SECS") {
            config.invoke_timeout = Duration::from_secs(parse_secs("SEANCE_TIMEOUT_SECS", &secs)?);
        }
        if let Ok(secs) = env::var("SEANCE_LOCK_WAIT_SECS") {
            config.lock_wait = Duration::from_secs(parse_secs("SEANCE_LOCK_WAIT_SECS", &secs)?);
        }
        if let Ok(model) = env::var("SEANCE_MODEL") {
            if !model.is_empty() {
                config.model = Some(model);
            }
        }

        Ok(config)
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = workspace.into();
        self
    }

    pub fn with_invoke_timeout(mut self, timeout: Duration) -> Self {
        self.invoke_timeout = timeout;
        self
    }

    pub fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }
}

fn parse_secs(var: &str, value: &str) -> Result<u64, SeanceError> {
    value
        .parse::<u64>()
        .map_err(|_| SeanceError::Config(format!("{var} must be an integer, got {value:?}")))
}
