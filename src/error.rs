//! Engine error types

use thiserror::Error;

use crate::types::{ConversationKey, FailureKind};

/// Errors produced by one subprocess invocation.
///
/// `Timeout`, `ProcessFailure`, and `MalformedOutput` are expected
/// failure modes and are recovered at the coordinator boundary.
/// `Setup` means the executable or environment is missing and the
/// invocation path cannot proceed.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// Subprocess exceeded the wall-clock timeout and was killed
    #[error("invocation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Subprocess exited non-zero with no parseable output
    #[error("subprocess exited with code {code}: {stderr}")]
    ProcessFailure { code: i32, stderr: String },

    /// Subprocess output was missing or not a valid result envelope
    #[error("malformed subprocess output: {0}")]
    MalformedOutput(String),

    /// Executable not found or could not be started
    #[error("invocation setup failed: {0}")]
    Setup(String),

    /// I/O error reading output from an already-running subprocess
    #[error("subprocess I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl InvokeError {
    /// Failure classification for delivery back to the conversation.
    ///
    /// Only `Setup` is fatal: a post-spawn read error is as transient
    /// as a non-zero exit and the next attempt may succeed.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::ProcessFailure { .. } | Self::Io(_) => FailureKind::ProcessFailure,
            Self::MalformedOutput(_) => FailureKind::MalformedOutput,
            Self::Setup(_) => FailureKind::SetupFatal,
        }
    }
}

/// Errors that can occur in the seance engine
#[derive(Debug, Error)]
pub enum SeanceError {
    /// Per-key exclusivity could not be acquired within the bounded wait
    #[error("conversation {0} is busy")]
    Busy(ConversationKey),

    /// Invocation failed
    #[error("invocation failed: {0}")]
    Invoke(#[from] InvokeError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl SeanceError {
    /// Failure classification for delivery back to the originating
    /// conversation; None for conditions with no conversation to notify.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Busy(_) => Some(FailureKind::Busy),
            Self::Invoke(e) => Some(e.failure_kind()),
            Self::Config(_) => None,
        }
    }
}
