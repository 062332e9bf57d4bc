//! Invocation coordinator - serializes work per conversation
//!
//! Decides for each inbound event whether to start a new session or
//! resume an existing one, serializes concurrent invocations for the
//! same conversation key, and records continuation tokens after each
//! successful invocation. Distinct keys proceed fully in parallel.

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::channel::{ChannelPair, SeanceChannel};
use crate::config::EngineConfig;
use crate::error::SeanceError;
use crate::invoker::Invoker;
use crate::registry::SessionRegistry;
use crate::types::{
    ContinuationToken, EngineEvent, InboundEvent, InvocationResult, SessionDirective,
};

/// The invocation coordinator.
///
/// Runs an event loop over the inbound channel, routing each event to a
/// per-conversation worker task. Workers keep unrelated conversations
/// fully parallel while processing their own queue strictly in the
/// order events were accepted.
pub struct Coordinator {
    shared: Arc<CoordinatorShared>,
    inbound_rx: tokio::sync::mpsc::UnboundedReceiver<InboundEvent>,
}

struct CoordinatorShared {
    registry: Arc<SessionRegistry>,
    invoker: Arc<dyn Invoker>,
    config: EngineConfig,
    event_tx: tokio::sync::mpsc::UnboundedSender<EngineEvent>,
}

impl Coordinator {
    /// Create a new coordinator with the given channel pair
    pub fn new(invoker: Arc<dyn Invoker>, config: EngineConfig, channels: ChannelPair) -> Self {
        Self {
            shared: Arc::new(CoordinatorShared {
                registry: Arc::new(SessionRegistry::new()),
                invoker,
                config,
                event_tx: channels.event_tx,
            }),
            inbound_rx: channels.inbound_rx,
        }
    }

    /// Create a coordinator and return a channel for communication
    pub fn with_channel(
        invoker: Arc<dyn Invoker>,
        config: EngineConfig,
    ) -> (Self, SeanceChannel) {
        let (channel, pair) = SeanceChannel::new();
        (Self::new(invoker, config, pair), channel)
    }

    /// Handle for dispatching synchronously (the HTTP-trigger path) and
    /// for inspecting the session registry.
    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Run the coordinator event loop
    ///
    /// Events are enqueued to their key's worker synchronously, in the
    /// order the loop receives them, so same-key invocations run in
    /// event-arrival order even under concurrent arrival. Workers live
    /// for the process's uptime, like their registry entries.
    #[instrument(skip(self))]
    pub async fn run(mut self) -> Result<(), SeanceError> {
        info!("Starting invocation coordinator");

        let mut workers: std::collections::HashMap<
            crate::types::ConversationKey,
            tokio::sync::mpsc::UnboundedSender<InboundEvent>,
        > = std::collections::HashMap::new();

        while let Some(event) = self.inbound_rx.recv().await {
            let worker = workers
                .entry(event.conversation.clone())
                .or_insert_with(|| Self::spawn_worker(Arc::clone(&self.shared)));
            if worker.send(event).is_err() {
                warn!("Conversation worker stopped, event dropped");
            }
        }

        info!("Invocation coordinator stopped");
        Ok(())
    }

    /// Spawn the worker task that drains one conversation's queue.
    fn spawn_worker(
        shared: Arc<CoordinatorShared>,
    ) -> tokio::sync::mpsc::UnboundedSender<InboundEvent> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<InboundEvent>();
        let _ = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                shared.handle_event(event).await;
            }
        });
        tx
    }
}

impl CoordinatorShared {
    /// Handle one inbound event end-to-end, emitting exactly one engine
    /// event: a reply on success, a failure description otherwise.
    async fn handle_event(&self, event: InboundEvent) {
        let conversation = event.conversation.clone();

        let outcome = match self.dispatch(&event).await {
            Ok(result) => EngineEvent::ReplyReady {
                conversation,
                response: result.response,
            },
            Err(e) => {
                let Some(kind) = e.failure_kind() else {
                    error!(conversation = %conversation, error = %e, "Unreportable failure");
                    return;
                };
                if kind.is_recoverable() {
                    warn!(conversation = %conversation, kind = %kind, error = %e, "Invocation failed");
                } else {
                    error!(conversation = %conversation, error = %e, "Invocation setup failed");
                }
                EngineEvent::Failed {
                    conversation,
                    kind,
                    detail: format!("Sorry, something went wrong: {e}"),
                }
            }
        };

        if self.event_tx.send(outcome).is_err() {
            warn!("Engine event receiver dropped, reply not delivered");
        }
    }

    /// Run one invocation under per-key exclusivity.
    ///
    /// The session lookup happens inside the critical section so a
    /// queued second reply resumes from the token the first one
    /// recorded. A failed invocation leaves the registry untouched; the
    /// prior token (if any) stays valid for the next attempt.
    async fn dispatch(&self, event: &InboundEvent) -> Result<InvocationResult, SeanceError> {
        let guard = self
            .registry
            .acquire(&event.conversation, self.config.lock_wait)
            .await?;

        let directive = if event.new_conversation {
            // A new conversation always starts a new session, even if a
            // stale record exists for this key.
            SessionDirective::Fresh(ContinuationToken::fresh())
        } else {
            match self.registry.lookup(&event.conversation).and_then(|r| r.token) {
                Some(token) => SessionDirective::Resume(token),
                None => {
                    debug!(
                        conversation = %event.conversation,
                        "No session record for reply, starting fresh"
                    );
                    SessionDirective::Fresh(ContinuationToken::fresh())
                }
            }
        };

        self.registry.touch(&event.conversation);

        let result = self.invoker.invoke(&event.prompt, &directive).await?;

        match &result.token {
            Some(token) => self.registry.upsert(&event.conversation, token.clone()),
            None => warn!(
                conversation = %event.conversation,
                "Invocation returned no continuation token, record left unchanged"
            ),
        }

        info!(
            conversation = %guard.key(),
            resumed = directive.is_resume(),
            response_len = result.response.len(),
            "Invocation completed"
        );

        Ok(result)
    }
}

/// Handle to the coordinator for external interaction
#[derive(Clone)]
pub struct CoordinatorHandle {
    shared: Arc<CoordinatorShared>,
}

impl CoordinatorHandle {
    /// Dispatch one event and wait for its result.
    ///
    /// This is the synchronous path used by the HTTP trigger; the chat
    /// gateway normally goes through the channel and the run loop.
    pub async fn dispatch(&self, event: &InboundEvent) -> Result<InvocationResult, SeanceError> {
        self.shared.dispatch(event).await
    }

    /// The session registry backing this coordinator.
    pub fn registry(&self) -> &SessionRegistry {
        &self.shared.registry
    }
}
