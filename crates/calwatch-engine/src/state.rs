use serde::{Deserialize, Serialize};

use calwatch_core::event::EventStore;
use calwatch_core::ids::ConversationId;

use crate::window::{MessageWindow, WindowPolicy};

/// Per-conversation lifecycle, tracked explicitly rather than inferred from
/// buffer length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    /// Window not full.
    Idle,
    /// Window full; the next append (or a forced analyze) starts a pass.
    Ready,
    /// An extraction call is in flight.
    Analyzing,
}

impl ConversationPhase {
    pub fn of(window: &MessageWindow) -> Self {
        if window.is_ready() {
            Self::Ready
        } else {
            Self::Idle
        }
    }
}

/// Everything the engine knows about one conversation. Created lazily on the
/// first message and kept for the life of the process.
#[derive(Clone, Debug)]
pub struct ConversationState {
    pub id: ConversationId,
    pub events: EventStore,
    pub window: MessageWindow,
}

impl ConversationState {
    pub fn new(id: ConversationId, window_capacity: usize, policy: WindowPolicy) -> Self {
        Self {
            id,
            events: EventStore::new(),
            window: MessageWindow::new(window_capacity, policy),
        }
    }

    pub fn phase(&self) -> ConversationPhase {
        ConversationPhase::of(&self.window)
    }
}
