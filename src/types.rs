//! Core protocol types shared across the engine

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier correlating a sequence of related inbound events
/// to one logical assistant session.
///
/// Typically a channel + thread identifier on the chat side, but the
/// engine treats it as fully opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConversationKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Opaque token issued by the subprocess that lets it resume prior
/// internal state on a later invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Allocate a fresh session identifier for a brand-new conversation.
    pub fn fresh() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContinuationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An inbound unit of work for the coordinator.
///
/// Both collaborators (chat gateway and HTTP trigger) reduce their
/// payloads to this contract before handing them to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Conversation this event belongs to
    pub conversation: ConversationKey,
    /// The prompt text to run
    pub prompt: String,
    /// True for a first mention or an externally triggered fresh thread;
    /// a new conversation never resumes, even if a stale record exists.
    pub new_conversation: bool,
}

impl InboundEvent {
    pub fn new(conversation: impl Into<ConversationKey>, prompt: impl Into<String>) -> Self {
        Self {
            conversation: conversation.into(),
            prompt: prompt.into(),
            new_conversation: true,
        }
    }

    pub fn reply(conversation: impl Into<ConversationKey>, prompt: impl Into<String>) -> Self {
        Self {
            conversation: conversation.into(),
            prompt: prompt.into(),
            new_conversation: false,
        }
    }
}

/// How the invoker should bind the subprocess to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionDirective {
    /// Start a new session under a pre-allocated identifier
    Fresh(ContinuationToken),
    /// Resume an existing session from its continuation token
    Resume(ContinuationToken),
}

impl SessionDirective {
    pub fn token(&self) -> &ContinuationToken {
        match self {
            Self::Fresh(t) | Self::Resume(t) => t,
        }
    }

    pub fn is_resume(&self) -> bool {
        matches!(self, Self::Resume(_))
    }
}

/// Parsed success envelope from one subprocess invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationResult {
    /// Full response text for delivery to the originating channel
    pub response: String,
    /// Token for resuming this session, when the subprocess reported one
    pub token: Option<ContinuationToken>,
    /// The subprocess completed but flagged its own result as an error
    pub reported_error: bool,
}

/// Failure classification surfaced to callers.
///
/// All but `SetupFatal` are recovered at the coordinator boundary and
/// leave the registry intact; `SetupFatal` halts the affected
/// invocation path and is not retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Subprocess exceeded the wall-clock timeout and was killed
    Timeout,
    /// Subprocess exited non-zero without a parseable result
    ProcessFailure,
    /// Subprocess output was missing or unparseable
    MalformedOutput,
    /// Per-key exclusivity could not be acquired within the bounded wait
    Busy,
    /// Executable or environment missing; not recoverable per-conversation
    SetupFatal,
}

impl FailureKind {
    /// Whether a later invocation for the same conversation can succeed.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::SetupFatal)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::ProcessFailure => "process failure",
            Self::MalformedOutput => "malformed output",
            Self::Busy => "busy",
            Self::SetupFatal => "setup failure",
        };
        f.write_str(s)
    }
}

/// Outbound event produced by the coordinator for each handled inbound
/// event. Every invocation yields exactly one of these; failures are
/// delivered, never silently dropped.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Invocation succeeded; deliver the response text in the thread
    ReplyReady {
        conversation: ConversationKey,
        response: String,
    },
    /// Invocation failed; deliver a description of the failure
    Failed {
        conversation: ConversationKey,
        kind: FailureKind,
        detail: String,
    },
}

impl EngineEvent {
    pub fn conversation(&self) -> &ConversationKey {
        match self {
            Self::ReplyReady { conversation, .. } | Self::Failed { conversation, .. } => {
                conversation
            }
        }
    }
}

/// Snapshot row describing one tracked session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub conversation: ConversationKey,
    pub token: Option<ContinuationToken>,
}

/// One tracked conversation-to-session correlation.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    /// Owning conversation key, unique within the registry
    pub conversation: ConversationKey,
    /// Absent until the first successful invocation for this key
    pub token: Option<ContinuationToken>,
    /// Updated on every invocation attempt, success or failure
    pub last_activity: SystemTime,
}

impl SessionRecord {
    pub fn new(conversation: ConversationKey) -> Self {
        Self {
            conversation,
            token: None,
            last_activity: SystemTime::now(),
        }
    }
}
