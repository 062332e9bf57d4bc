//! Communication channels between the engine and its collaborators
//!
//! The chat gateway and the HTTP trigger both live on the client side
//! of this seam: they reduce platform payloads to [`InboundEvent`]s and
//! deliver [`EngineEvent`]s back to the originating conversation
//! (chunking, formatting, and authentication are theirs).

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::types::{EngineEvent, InboundEvent};

/// Channel pair held by the coordinator
pub struct ChannelPair {
    /// Receiver for inbound events
    pub inbound_rx: mpsc::UnboundedReceiver<InboundEvent>,
    /// Sender for outbound engine events
    pub event_tx: mpsc::UnboundedSender<EngineEvent>,
}

/// Client-side channel for communicating with the coordinator
#[derive(Clone)]
pub struct SeanceChannel {
    /// Sender for inbound events
    inbound_tx: mpsc::UnboundedSender<InboundEvent>,
    /// Receiver for outbound engine events
    event_rx: Arc<Mutex<mpsc::UnboundedReceiver<EngineEvent>>>,
}

impl SeanceChannel {
    /// Create a new channel pair
    ///
    /// Returns the client channel and the coordinator channel pair
    pub fn new() -> (Self, ChannelPair) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let channel = Self {
            inbound_tx,
            event_rx: Arc::new(Mutex::new(event_rx)),
        };

        let pair = ChannelPair {
            inbound_rx,
            event_tx,
        };

        (channel, pair)
    }

    /// Send an inbound event to the coordinator
    pub fn send(&self, event: InboundEvent) -> Result<(), ChannelError> {
        self.inbound_tx.send(event).map_err(|_| ChannelError::Closed)
    }

    /// Try to receive an engine event (non-blocking)
    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_lock().ok()?.try_recv().ok()
    }

    /// Receive an engine event, waiting until one is available
    pub async fn recv(&self) -> Option<EngineEvent> {
        self.event_rx.lock().await.recv().await
    }

    /// Check if the coordinator side is gone
    pub fn is_closed(&self) -> bool {
        self.inbound_tx.is_closed()
    }
}

/// Channel errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConversationKey;

    #[test]
    fn test_channel_creation() {
        let (channel, _pair) = SeanceChannel::new();
        assert!(!channel.is_closed());
    }

    #[test]
    fn test_send_inbound_event() {
        let (channel, mut pair) = SeanceChannel::new();

        channel.send(InboundEvent::new("T1", "status?")).unwrap();

        let received = pair.inbound_rx.try_recv().unwrap();
        assert_eq!(received.conversation.as_str(), "T1");
        assert!(received.new_conversation);
    }

    #[test]
    fn test_send_after_coordinator_drop() {
        let (channel, pair) = SeanceChannel::new();
        drop(pair);
        assert!(channel.is_closed());
        assert!(channel.send(InboundEvent::new("T1", "hi")).is_err());
    }

    #[tokio::test]
    async fn test_receive_engine_event() {
        let (channel, pair) = SeanceChannel::new();

        pair.event_tx
            .send(EngineEvent::ReplyReady {
                conversation: ConversationKey::from("T1"),
                response: "done".to_string(),
            })
            .unwrap();

        let received = channel.recv().await.unwrap();
        assert_eq!(received.conversation().as_str(), "T1");
        assert!(channel.try_recv().is_none());
    }
}
