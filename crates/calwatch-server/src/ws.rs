use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use calwatch_core::ids::ConversationId;

use crate::outbound::Confirmation;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Push confirmations to one WebSocket client until either side goes away.
///
/// With `only` set, confirmations for other conversations are skipped.
pub async fn handle_ws_connection(
    socket: WebSocket,
    mut rx: broadcast::Receiver<Confirmation>,
    only: Option<ConversationId>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let confirmation = match msg {
                        Ok(c) => c,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "WebSocket subscriber lagged, dropped confirmations");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    };
                    if !wanted(only.as_ref(), &confirmation) {
                        continue;
                    }
                    let Ok(json) = serde_json::to_string(&confirmation) else {
                        continue;
                    };
                    if ws_tx.send(WsMessage::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Inbound frames carry nothing; the reader only watches for close.
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            if matches!(msg, WsMessage::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }
    tracing::info!("WebSocket client disconnected");
}

fn wanted(only: Option<&ConversationId>, confirmation: &Confirmation) -> bool {
    only.map_or(true, |id| *id == confirmation.conversation_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmation(id: &str) -> Confirmation {
        Confirmation {
            conversation_id: ConversationId::from_raw(id),
            text: "No action needed.".into(),
        }
    }

    #[test]
    fn unfiltered_client_gets_everything() {
        assert!(wanted(None, &confirmation("a")));
    }

    #[test]
    fn filtered_client_gets_only_its_conversation() {
        let only = ConversationId::from_raw("a");
        assert!(wanted(Some(&only), &confirmation("a")));
        assert!(!wanted(Some(&only), &confirmation("b")));
    }
}
