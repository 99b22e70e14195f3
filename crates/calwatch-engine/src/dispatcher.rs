//! Routes inbound messages to per-conversation state and triggers analysis.
//!
//! Each conversation owns a slot guarded by an async mutex. The guard is held
//! from append through settle, so at most one pass runs per conversation and
//! later messages for it queue in arrival order. Different conversations
//! never wait on each other.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, instrument, warn, Instrument};

use calwatch_core::event::Event;
use calwatch_core::ids::ConversationId;
use calwatch_core::messages::InboundMessage;

use crate::error::EngineError;
use crate::reconcile::{AnalysisReport, ReconciliationEngine};
use crate::state::{ConversationPhase, ConversationState};
use crate::window::WindowPolicy;

/// What happened to one inbound message.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Blank text, dropped before reaching any conversation.
    Ignored,
    /// Buffered without triggering a pass.
    Buffered {
        phase: ConversationPhase,
        buffered: usize,
    },
    Analyzed(AnalysisReport),
    /// The pass ran and failed. Nothing was mutated.
    Failed(EngineError),
}

/// Read-only view of a conversation.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSnapshot {
    pub id: ConversationId,
    pub phase: ConversationPhase,
    pub buffered: usize,
    pub events: Vec<Event>,
}

struct ConversationSlot {
    state: Arc<Mutex<ConversationState>>,
    // Readable without waiting for an in-flight pass.
    phase: RwLock<ConversationPhase>,
}

impl ConversationSlot {
    fn new(state: ConversationState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            phase: RwLock::new(ConversationPhase::Idle),
        }
    }

    fn set_phase(&self, phase: ConversationPhase) {
        *self.phase.write() = phase;
    }

    async fn lock(&self) -> OwnedMutexGuard<ConversationState> {
        Arc::clone(&self.state).lock_owned().await
    }
}

pub struct Dispatcher {
    engine: Arc<ReconciliationEngine>,
    window_capacity: usize,
    policy: WindowPolicy,
    slots: DashMap<ConversationId, Arc<ConversationSlot>>,
}

impl Dispatcher {
    pub fn new(engine: Arc<ReconciliationEngine>, window_capacity: usize, policy: WindowPolicy) -> Self {
        Self {
            engine,
            window_capacity: window_capacity.max(1),
            policy,
            slots: DashMap::new(),
        }
    }

    pub fn policy(&self) -> WindowPolicy {
        self.policy
    }

    pub fn window_capacity(&self) -> usize {
        self.window_capacity
    }

    /// Buffer a message and run a pass when its window fills up.
    ///
    /// Once the message is appended the pass runs on its own task, so
    /// dropping this future does not interrupt it.
    #[instrument(skip(self, message), fields(conversation_id = %conversation_id))]
    pub async fn on_message(&self, conversation_id: ConversationId, message: InboundMessage) -> DispatchOutcome {
        if message.is_blank() {
            debug!("ignoring blank message");
            return DispatchOutcome::Ignored;
        }

        let slot = self.slot(&conversation_id);
        let mut state = slot.lock().await;

        if !state.window.append(message) {
            let phase = state.phase();
            slot.set_phase(phase);
            debug!(buffered = state.window.len(), "message buffered");
            return DispatchOutcome::Buffered {
                phase,
                buffered: state.window.len(),
            };
        }

        let pass = self.spawn_pass(slot, state);
        match pass.await {
            Ok(Some(report)) => DispatchOutcome::Analyzed(report),
            Ok(None) => match self.snapshot(&conversation_id).await {
                Some(snapshot) => DispatchOutcome::Buffered {
                    phase: snapshot.phase,
                    buffered: snapshot.buffered,
                },
                None => DispatchOutcome::Ignored,
            },
            Err(e) => DispatchOutcome::Failed(e),
        }
    }

    /// Force a pass over a conversation's current window.
    ///
    /// Unknown conversations and windows that are not full yield `Ok(None)`
    /// and leave the window untouched.
    pub async fn analyze(&self, conversation_id: &ConversationId) -> Result<Option<AnalysisReport>, EngineError> {
        let Some(slot) = self.existing(conversation_id) else {
            return Ok(None);
        };
        let state = slot.lock().await;
        if !state.window.is_ready() {
            return Ok(None);
        }
        self.spawn_pass(slot, state).await
    }

    /// Run a pass on its own task while holding the conversation lock.
    ///
    /// The phase is restored and the window settled inside the task, so a
    /// caller that stops waiting cannot leave the conversation mid-pass.
    fn spawn_pass(
        &self,
        slot: Arc<ConversationSlot>,
        mut state: OwnedMutexGuard<ConversationState>,
    ) -> impl Future<Output = Result<Option<AnalysisReport>, EngineError>> {
        let engine = Arc::clone(&self.engine);
        slot.set_phase(ConversationPhase::Analyzing);
        let task = tokio::spawn(
            async move {
                let result = engine.analyze(&mut state).await;
                state.window.settle();
                slot.set_phase(state.phase());
                result
            }
            .in_current_span(),
        );
        async move {
            match task.await {
                Ok(result) => result,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => {
                    warn!(error = %e, "analysis task cancelled");
                    Err(EngineError::Interrupted)
                }
            }
        }
    }

    /// Current phase, without waiting on an in-flight pass.
    pub fn phase(&self, conversation_id: &ConversationId) -> Option<ConversationPhase> {
        self.slots.get(conversation_id).map(|slot| *slot.phase.read())
    }

    /// Recorded events in 1-based order. Waits for any in-flight pass.
    pub async fn events(&self, conversation_id: &ConversationId) -> Option<Vec<Event>> {
        let slot = self.existing(conversation_id)?;
        let state = slot.state.lock().await;
        Some(state.events.as_slice().to_vec())
    }

    pub async fn snapshot(&self, conversation_id: &ConversationId) -> Option<ConversationSnapshot> {
        let slot = self.existing(conversation_id)?;
        let state = slot.state.lock().await;
        let phase = *slot.phase.read();
        Some(ConversationSnapshot {
            id: state.id.clone(),
            phase,
            buffered: state.window.len(),
            events: state.events.as_slice().to_vec(),
        })
    }

    pub fn conversation_count(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, conversation_id: &ConversationId) -> Arc<ConversationSlot> {
        let entry = self
            .slots
            .entry(conversation_id.clone())
            .or_insert_with(|| {
                debug!(conversation_id = %conversation_id, "new conversation");
                Arc::new(ConversationSlot::new(ConversationState::new(
                    conversation_id.clone(),
                    self.window_capacity,
                    self.policy,
                )))
            });
        Arc::clone(&*entry)
    }

    fn existing(&self, conversation_id: &ConversationId) -> Option<Arc<ConversationSlot>> {
        self.slots.get(conversation_id).map(|slot| Arc::clone(&*slot))
    }
}
