use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::ids::ConversationId;

#[derive(Clone, Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no receiver for conversation {0}")]
    NoReceiver(ConversationId),
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Outbound half of the message transport. Delivery is fire-and-forget from
/// the engine's point of view: errors are logged, never rolled back.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, conversation_id: &ConversationId, text: &str)
        -> Result<(), TransportError>;
}

/// Transport that records every send. Can be switched into a failing mode.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(ConversationId, String)>>,
    fail: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let transport = Self::default();
        transport.set_failing(true);
        transport
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    pub fn sent(&self) -> Vec<(ConversationId, String)> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, conversation_id: &ConversationId) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|(id, _)| id == conversation_id)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(
        &self,
        conversation_id: &ConversationId,
        text: &str,
    ) -> Result<(), TransportError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(TransportError::Delivery("recording transport set to fail".into()));
        }
        self.sent
            .lock()
            .push((conversation_id.clone(), text.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_sends_per_conversation() {
        let transport = RecordingTransport::new();
        let a = ConversationId::from_raw("a");
        let b = ConversationId::from_raw("b");

        transport.send(&a, "one").await.unwrap();
        transport.send(&b, "two").await.unwrap();
        transport.send(&a, "three").await.unwrap();

        assert_eq!(transport.sent().len(), 3);
        assert_eq!(transport.sent_to(&a), ["one", "three"]);
    }

    #[tokio::test]
    async fn failing_mode_records_nothing() {
        let transport = RecordingTransport::failing();
        let id = ConversationId::from_raw("a");
        assert!(transport.send(&id, "lost").await.is_err());
        assert!(transport.sent().is_empty());

        transport.set_failing(false);
        assert!(transport.send(&id, "kept").await.is_ok());
        assert_eq!(transport.sent_to(&id), ["kept"]);
    }
}
