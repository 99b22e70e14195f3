use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use calwatch_core::event::Event;
use calwatch_core::ids::ConversationId;
use calwatch_core::messages::InboundMessage;
use calwatch_engine::{DispatchOutcome, EngineError};

use crate::server::AppState;
use crate::ws;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessage {
    pub conversation_id: String,
    pub text: String,
    /// Defaults to the time of receipt.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Event as listed over HTTP, with its 1-based position.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedEvent<'a> {
    pub index: usize,
    #[serde(flatten)]
    pub event: &'a Event,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsParams {
    pub conversation_id: Option<String>,
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn not_found(id: &ConversationId) -> Response {
    error_body(StatusCode::NOT_FOUND, format!("unknown conversation {id}"))
}

pub async fn post_message(State(state): State<AppState>, Json(body): Json<PostMessage>) -> Response {
    if body.conversation_id.trim().is_empty() {
        return error_body(StatusCode::BAD_REQUEST, "conversationId must not be empty");
    }

    let id = ConversationId::from_raw(body.conversation_id);
    let message = InboundMessage::new(body.text, body.timestamp.unwrap_or_else(Utc::now));

    match state.dispatcher.on_message(id.clone(), message).await {
        DispatchOutcome::Ignored => {
            (StatusCode::ACCEPTED, Json(json!({ "status": "ignored" }))).into_response()
        }
        DispatchOutcome::Buffered { phase, buffered } => (
            StatusCode::ACCEPTED,
            Json(json!({ "status": "buffered", "conversationId": id, "phase": phase, "buffered": buffered })),
        )
            .into_response(),
        DispatchOutcome::Analyzed(report) => (
            StatusCode::OK,
            Json(json!({ "status": "analyzed", "conversationId": id, "report": report })),
        )
            .into_response(),
        DispatchOutcome::Failed(err) => {
            let status = match err {
                EngineError::CapabilityUnavailable(_) => StatusCode::BAD_GATEWAY,
                EngineError::MalformedResponse { .. } | EngineError::InvalidIndex { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                EngineError::Interrupted => StatusCode::SERVICE_UNAVAILABLE,
            };
            (
                status,
                Json(json!({
                    "status": "failed",
                    "conversationId": id,
                    "error": err.to_string(),
                    "errorKind": err.kind(),
                })),
            )
                .into_response()
        }
    }
}

pub async fn list_events(State(state): State<AppState>, Path(raw_id): Path<String>) -> Response {
    let id = ConversationId::from_raw(raw_id);
    let Some(events) = state.dispatcher.events(&id).await else {
        return not_found(&id);
    };
    let indexed: Vec<IndexedEvent<'_>> = events
        .iter()
        .enumerate()
        .map(|(i, event)| IndexedEvent { index: i + 1, event })
        .collect();
    Json(json!({ "conversationId": id, "events": indexed })).into_response()
}

pub async fn get_conversation(State(state): State<AppState>, Path(raw_id): Path<String>) -> Response {
    let id = ConversationId::from_raw(raw_id);
    let Some(snapshot) = state.dispatcher.snapshot(&id).await else {
        return not_found(&id);
    };
    Json(json!({
        "conversationId": snapshot.id,
        "phase": snapshot.phase,
        "buffered": snapshot.buffered,
        "eventCount": snapshot.events.len(),
    }))
    .into_response()
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "conversations": state.dispatcher.conversation_count(),
        "window": {
            "capacity": state.dispatcher.window_capacity(),
            "policy": state.dispatcher.policy(),
        },
        "subscribers": state.transport.subscriber_count(),
    }))
}

pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let only = params
        .conversation_id
        .filter(|id| !id.is_empty())
        .map(ConversationId::from_raw);
    let rx = state.transport.subscribe();
    tracing::info!(filter = ?only, "WebSocket client connected");
    ws.on_upgrade(move |socket| ws::handle_ws_connection(socket, rx, only))
}
