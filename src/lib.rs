//! # Seance
//!
//! Session correlation and process invocation engine - the channeling table.
//!
//! Seance maps an external conversational context (a chat thread, or an
//! externally triggered equivalent) to exactly one long-running headless
//! assistant session, serializes concurrent work against that session,
//! and manages the lifecycle of the subprocess doing the actual work.
//!
//! ## Architecture
//!
//! ```text
//!   chat gateway / HTTP trigger          (collaborators, client side)
//!            │  InboundEvent                      ▲  EngineEvent
//!            ▼                                    │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     COORDINATOR (run loop)                      │
//! │   resolve key → acquire per-key lock → lookup → invoke → upsert │
//! └───────────────┬─────────────────────────────┬───────────────────┘
//!                 ▼                             ▼
//!       ┌──────────────────┐          ┌──────────────────┐
//!       │ Session Registry │          │  Process Invoker │
//!       │  key → token     │          │  headless CLI,   │
//!       │  per-key locks   │          │  timeout, parse  │
//!       └──────────────────┘          └────────┬─────────┘
//!                                              ▼
//!                                     assistant subprocess
//! ```
//!
//! ## Key Concepts
//!
//! - **Conversation key**: stable identifier correlating related inbound
//!   events to one logical session
//! - **Continuation token**: opaque value letting the subprocess resume
//!   prior internal state on a later invocation
//! - **Exclusivity**: at most one invocation runs per conversation key at
//!   a time; distinct keys proceed fully in parallel
//!
//! Session correlation is in-memory only: a restart loses the mapping and
//! later replies in previously active conversations start fresh sessions.

pub mod channel;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod invoker;
pub mod registry;
pub mod types;

pub use channel::{ChannelPair, SeanceChannel};
pub use config::EngineConfig;
pub use coordinator::{Coordinator, CoordinatorHandle};
pub use error::{InvokeError, SeanceError};
pub use invoker::{HeadlessInvoker, Invoker};
pub use registry::{KeyGuard, SessionRegistry};
pub use types::{
    ContinuationToken, ConversationKey, EngineEvent, FailureKind, InboundEvent, InvocationResult,
    SessionDirective, SessionInfo, SessionRecord,
};
