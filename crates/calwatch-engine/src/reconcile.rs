//! The reconciliation pass: prompt → extraction → validation → mutation →
//! confirmation.
//!
//! This is the only place where extraction output reaches the event list.
//! Validation happens entirely before mutation, so a failed pass never
//! leaves the list half-updated. Delivery of the confirmation happens after
//! the mutation has committed and its failure is only logged.

use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use calwatch_core::errors::GatewayError;
use calwatch_core::event::{Event, EventStore, EventStoreError};
use calwatch_core::messages::PromptMessage;
use calwatch_core::provider::ExtractionProvider;
use calwatch_core::transport::Transport;

use crate::context::build_prompt;
use crate::error::EngineError;
use crate::response::{parse_response, Action, ExtractionResult};
use crate::state::ConversationState;

pub const ADDED_MESSAGE: &str = "New event added!";
pub const UPDATED_MESSAGE: &str = "Event updated!";
pub const DELETED_MESSAGE: &str = "Event deleted!";
pub const NO_ACTION_MESSAGE: &str = "No action needed.";

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Upper bound on a single extraction call.
    pub extraction_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            extraction_timeout: Duration::from_secs(30),
        }
    }
}

/// What a pass did to the event list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AppliedChange {
    Added { event: Event },
    Updated { index: usize, event: Event },
    Deleted { index: usize, event: Event },
    Unchanged,
}

impl AppliedChange {
    pub fn event(&self) -> Option<&Event> {
        match self {
            Self::Added { event } | Self::Updated { event, .. } | Self::Deleted { event, .. } => {
                Some(event)
            }
            Self::Unchanged => None,
        }
    }
}

/// Outcome of a successful pass.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub result: ExtractionResult,
    pub change: AppliedChange,
    pub confirmation: String,
    /// False when the transport rejected the confirmation. The change stands.
    pub delivered: bool,
}

fn store_error(field: &'static str, err: EventStoreError) -> EngineError {
    match err {
        EventStoreError::IndexOutOfRange { index, len } => EngineError::InvalidIndex {
            field,
            index: i64::try_from(index).unwrap_or(i64::MAX),
            len,
        },
    }
}

fn inconsistent(result: &ExtractionResult) -> EngineError {
    EngineError::malformed(
        format!("inconsistent '{}' result", result.action.as_str()),
        String::new(),
    )
}

/// Apply a validated result to `store`.
pub fn apply(
    store: &mut EventStore,
    result: &ExtractionResult,
    now: DateTime<Utc>,
) -> Result<AppliedChange, EngineError> {
    match result.action {
        Action::Add => {
            let draft = result.draft.clone().ok_or_else(|| inconsistent(result))?;
            let event = store.add(draft, now).clone();
            Ok(AppliedChange::Added { event })
        }
        Action::Update => {
            let (Some(index), Some(draft)) = (result.target_index, result.draft.clone()) else {
                return Err(inconsistent(result));
            };
            let event = store
                .update(index, draft, now)
                .map_err(|e| store_error("update_index", e))?
                .clone();
            Ok(AppliedChange::Updated { index, event })
        }
        Action::Delete => {
            let index = result.target_index.ok_or_else(|| inconsistent(result))?;
            let event = store
                .remove(index)
                .map_err(|e| store_error("update_index", e))?;
            Ok(AppliedChange::Deleted { index, event })
        }
        Action::None => Ok(AppliedChange::Unchanged),
    }
}

/// Human-readable summary sent back to the conversation.
///
/// Conflict indices refer to the event list as it was before the change.
pub fn compose_confirmation(result: &ExtractionResult, change: &AppliedChange) -> String {
    let headline = match change {
        AppliedChange::Added { .. } => ADDED_MESSAGE,
        AppliedChange::Updated { .. } => UPDATED_MESSAGE,
        AppliedChange::Deleted { .. } => DELETED_MESSAGE,
        AppliedChange::Unchanged => NO_ACTION_MESSAGE,
    };

    let mut out = String::from(headline);
    let subject = change
        .event()
        .map(|e| (&e.description, &e.category, &e.time))
        .or_else(|| {
            result
                .draft
                .as_ref()
                .map(|d| (&d.description, &d.category, &d.time))
        });
    if let Some((description, category, time)) = subject {
        let _ = write!(out, "\nEvent: {description}\nType: {category}\nTime: {time}");
    }

    if !result.conflicts.is_empty() {
        let indices: Vec<String> = result.conflicts.iter().map(ToString::to_string).collect();
        let _ = write!(out, "\n⚠️ Conflicts with events: {}", indices.join(", "));
    }
    out
}

pub struct ReconciliationEngine {
    provider: Arc<dyn ExtractionProvider>,
    transport: Arc<dyn Transport>,
    config: EngineConfig,
}

impl ReconciliationEngine {
    pub fn new(
        provider: Arc<dyn ExtractionProvider>,
        transport: Arc<dyn Transport>,
        config: EngineConfig,
    ) -> Self {
        Self {
            provider,
            transport,
            config,
        }
    }

    /// Run one pass over the conversation's window.
    ///
    /// Returns `Ok(None)` without touching anything when the window is not
    /// ready or holds no text. The window itself is left as-is; applying the
    /// window policy is the caller's job.
    #[instrument(skip(self, state), fields(conversation_id = %state.id, provider = self.provider.name()))]
    pub async fn analyze(
        &self,
        state: &mut ConversationState,
    ) -> Result<Option<AnalysisReport>, EngineError> {
        if !state.window.is_ready() {
            debug!(buffered = state.window.len(), "window not ready, skipping");
            return Ok(None);
        }

        let prompt = {
            let texts = state.window.contents();
            if texts.is_empty() {
                debug!("window holds no text, skipping");
                return Ok(None);
            }
            build_prompt(state.events.as_slice(), &texts, &Local::now())
        };

        let raw = match self.invoke(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, error_kind = e.error_kind(), "extraction call failed");
                return Err(e.into());
            }
        };

        let result = match parse_response(&raw, state.events.len()) {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, error_kind = e.kind(), raw = %raw, "rejected extraction response");
                return Err(e);
            }
        };

        let change = apply(&mut state.events, &result, Utc::now())?;
        info!(
            action = result.action.as_str(),
            events = state.events.len(),
            conflicts = ?result.conflicts,
            "applied extraction result"
        );

        let confirmation = compose_confirmation(&result, &change);
        let delivered = match self.transport.send(&state.id, &confirmation).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to deliver confirmation");
                false
            }
        };

        Ok(Some(AnalysisReport {
            result,
            change,
            confirmation,
            delivered,
        }))
    }

    async fn invoke(&self, prompt: &[PromptMessage]) -> Result<String, GatewayError> {
        let timeout = self.config.extraction_timeout;
        match tokio::time::timeout(timeout, self.provider.invoke(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calwatch_core::event::EventDraft;
    use calwatch_core::ids::ConversationId;
    use calwatch_core::messages::InboundMessage;
    use calwatch_core::transport::RecordingTransport;
    use calwatch_llm::{MockProvider, MockResponse};
    use serde_json::json;

    use crate::window::WindowPolicy;

    fn store_with(descriptions: &[&str]) -> EventStore {
        let mut store = EventStore::new();
        for d in descriptions {
            store.add(EventDraft::new(*d, "meeting", "none"), Utc::now());
        }
        store
    }

    fn result(action: Action, draft: Option<EventDraft>, target: Option<usize>) -> ExtractionResult {
        ExtractionResult {
            action,
            draft,
            conflicts: Vec::new(),
            target_index: target,
        }
    }

    fn ready_state(texts: &[&str]) -> ConversationState {
        let mut state = ConversationState::new(
            ConversationId::from_raw("chat-1"),
            texts.len(),
            WindowPolicy::Drain,
        );
        for t in texts {
            state.window.append(InboundMessage::now(*t));
        }
        state
    }

    fn engine(
        responses: Vec<MockResponse>,
        transport: Arc<RecordingTransport>,
        timeout: Duration,
    ) -> (ReconciliationEngine, Arc<MockProvider>) {
        let provider = Arc::new(MockProvider::new(responses));
        let engine = ReconciliationEngine::new(
            provider.clone(),
            transport,
            EngineConfig {
                extraction_timeout: timeout,
            },
        );
        (engine, provider)
    }

    // -- apply --

    #[test]
    fn none_leaves_events_untouched() {
        let mut store = store_with(&["a", "b"]);
        let before = store.clone();
        let change = apply(&mut store, &result(Action::None, None, None), Utc::now()).unwrap();
        assert_eq!(change, AppliedChange::Unchanged);
        assert_eq!(store, before);
    }

    #[test]
    fn add_increments_length() {
        let mut store = store_with(&["a"]);
        let draft = EventDraft::new("Lunch with Sam", "social", "12:00");
        let change = apply(
            &mut store,
            &result(Action::Add, Some(draft.clone()), None),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(store.len(), 2);
        let added = store.get(2).unwrap();
        assert_eq!(added.description, draft.description);
        assert_eq!(added.category, draft.category);
        assert_eq!(added.time, draft.time);
        assert!(matches!(change, AppliedChange::Added { .. }));
    }

    #[test]
    fn update_preserves_length_and_other_entries() {
        let mut store = store_with(&["a", "b", "c"]);
        let before = store.clone();
        let draft = EventDraft::new("b moved", "meeting", "15:00");
        apply(
            &mut store,
            &result(Action::Update, Some(draft), Some(2)),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.get(1), before.get(1));
        assert_eq!(store.get(3), before.get(3));
        let updated = store.get(2).unwrap();
        assert_eq!(updated.description, "b moved");
        assert!(updated.updated_at.is_some());
        assert_eq!(updated.id, before.get(2).unwrap().id);
    }

    #[test]
    fn delete_shifts_later_entries_down() {
        let mut store = store_with(&["a", "b", "c", "d"]);
        let change = apply(&mut store, &result(Action::Delete, None, Some(2)), Utc::now()).unwrap();
        let names: Vec<_> = store.iter().map(|e| e.description.as_str()).collect();
        assert_eq!(names, ["a", "c", "d"]);
        assert!(matches!(change, AppliedChange::Deleted { index: 2, ref event } if event.description == "b"));
    }

    #[test]
    fn out_of_range_apply_is_rejected_without_mutation() {
        let mut store = store_with(&["a"]);
        let before = store.clone();
        let err = apply(&mut store, &result(Action::Delete, None, Some(5)), Utc::now()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidIndex { index: 5, len: 1, .. }));
        assert_eq!(store, before);
    }

    // -- confirmation --

    #[test]
    fn confirmation_for_add_lists_fields() {
        let mut store = EventStore::new();
        let r = result(
            Action::Add,
            Some(EventDraft::new("Lunch with Sam", "social", "12:00 22.01.2025")),
            None,
        );
        let change = apply(&mut store, &r, Utc::now()).unwrap();
        assert_eq!(
            compose_confirmation(&r, &change),
            "New event added!\nEvent: Lunch with Sam\nType: social\nTime: 12:00 22.01.2025"
        );
    }

    #[test]
    fn confirmation_lists_conflicts() {
        let mut r = result(Action::None, None, None);
        r.conflicts = vec![1, 3];
        let text = compose_confirmation(&r, &AppliedChange::Unchanged);
        assert_eq!(text, "No action needed.\n⚠️ Conflicts with events: 1, 3");
    }

    #[test]
    fn confirmation_for_delete_describes_removed_event() {
        let mut store = store_with(&["Dentist"]);
        let r = result(Action::Delete, None, Some(1));
        let change = apply(&mut store, &r, Utc::now()).unwrap();
        let text = compose_confirmation(&r, &change);
        assert!(text.starts_with("Event deleted!\nEvent: Dentist"));
    }

    // -- analyze --

    #[tokio::test]
    async fn not_ready_is_a_silent_no_op() {
        let transport = Arc::new(RecordingTransport::new());
        let (engine, provider) = engine(vec![], transport.clone(), Duration::from_secs(5));
        let mut state = ConversationState::new(ConversationId::from_raw("c"), 2, WindowPolicy::Drain);
        state.window.append(InboundMessage::now("only one"));

        assert!(engine.analyze(&mut state).await.unwrap().is_none());
        assert_eq!(provider.call_count(), 0);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn capability_failure_mutates_nothing() {
        let transport = Arc::new(RecordingTransport::new());
        let (engine, _) = engine(
            vec![MockResponse::Error(GatewayError::NetworkError("refused".into()))],
            transport.clone(),
            Duration::from_secs(5),
        );
        let mut state = ready_state(&["hello", "there"]);
        state.events = store_with(&["keep me"]);
        let before = state.events.clone();

        let err = engine.analyze(&mut state).await.unwrap_err();
        assert!(matches!(err, EngineError::CapabilityUnavailable(GatewayError::NetworkError(_))));
        assert_eq!(state.events, before);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_capability_times_out() {
        let transport = Arc::new(RecordingTransport::new());
        let (engine, _) = engine(
            vec![MockResponse::delayed(
                Duration::from_secs(120),
                MockResponse::json(&json!({"action": "none", "conflicts": []})),
            )],
            transport.clone(),
            Duration::from_secs(10),
        );
        let mut state = ready_state(&["a", "b"]);

        let err = engine.analyze(&mut state).await.unwrap_err();
        assert!(matches!(err, EngineError::CapabilityUnavailable(GatewayError::Timeout(d)) if d == Duration::from_secs(10)));
        assert!(state.events.is_empty());
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn delivery_failure_keeps_the_change() {
        let transport = Arc::new(RecordingTransport::failing());
        let (engine, _) = engine(
            vec![MockResponse::json(&json!({
                "action": "add", "event": "Standup", "type": "meeting",
                "time": "09:00", "conflicts": [], "update_index": null
            }))],
            transport.clone(),
            Duration::from_secs(5),
        );
        let mut state = ready_state(&["standup at 9", "every day"]);

        let report = engine.analyze(&mut state).await.unwrap().unwrap();
        assert!(!report.delivered);
        assert_eq!(state.events.len(), 1);
        assert_eq!(state.events.get(1).unwrap().description, "Standup");
    }

    #[tokio::test]
    async fn prompt_carries_prior_events_and_window_text() {
        let transport = Arc::new(RecordingTransport::new());
        let (engine, provider) = engine(
            vec![MockResponse::json(&json!({"action": "none", "conflicts": []}))],
            transport.clone(),
            Duration::from_secs(5),
        );
        let mut state = ready_state(&["is the sync still on?", "  "]);
        state.events = store_with(&["Team sync"]);

        let report = engine.analyze(&mut state).await.unwrap().unwrap();
        assert_eq!(report.change, AppliedChange::Unchanged);
        assert_eq!(report.confirmation, NO_ACTION_MESSAGE);

        let prompt = provider.last_prompt().unwrap();
        assert!(prompt[0].content.contains("1. Event: Team sync, Type: meeting, Time: none"));
        assert_eq!(prompt[1].content, "is the sync still on?");
        assert_eq!(transport.sent_to(&state.id), [NO_ACTION_MESSAGE]);
    }
}
