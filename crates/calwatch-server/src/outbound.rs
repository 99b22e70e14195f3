use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

use calwatch_core::ids::ConversationId;
use calwatch_core::transport::{Transport, TransportError};

/// One confirmation on its way to WebSocket subscribers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "confirmation", rename_all = "camelCase")]
pub struct Confirmation {
    pub conversation_id: ConversationId,
    pub text: String,
}

/// `Transport` that fans confirmations out over a broadcast channel.
///
/// Each WebSocket connection holds its own receiver. A send with no live
/// receivers is reported as a delivery failure.
pub struct BroadcastTransport {
    tx: broadcast::Sender<Confirmation>,
}

impl BroadcastTransport {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Confirmation> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl Transport for BroadcastTransport {
    async fn send(&self, conversation_id: &ConversationId, text: &str) -> Result<(), TransportError> {
        let confirmation = Confirmation {
            conversation_id: conversation_id.clone(),
            text: text.to_string(),
        };
        match self.tx.send(confirmation) {
            Ok(receivers) => {
                tracing::debug!(conversation_id = %conversation_id, receivers, "confirmation broadcast");
                Ok(())
            }
            Err(_) => Err(TransportError::NoReceiver(conversation_id.clone())),
        }
    }
}
