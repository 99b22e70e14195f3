use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use calwatch_core::messages::InboundMessage;

/// What happens to a full window once an analysis pass has finished.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPolicy {
    /// Clear the window after every pass, successful or not. Each batch of
    /// `capacity` messages is analysed exactly once.
    #[default]
    Drain,
    /// Keep the window. Once warmed up, every new message evicts the oldest
    /// and re-triggers analysis over the overlapping window.
    Sliding,
}

/// Bounded buffer of the most recent messages of one conversation.
#[derive(Clone, Debug)]
pub struct MessageWindow {
    capacity: usize,
    policy: WindowPolicy,
    buffer: VecDeque<InboundMessage>,
}

impl MessageWindow {
    /// A zero capacity is raised to 1.
    pub fn new(capacity: usize, policy: WindowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            policy,
            buffer: VecDeque::with_capacity(capacity),
        }
    }

    /// Buffer `message`, evicting the oldest entry when already full.
    /// Returns whether the window is ready for analysis afterwards.
    pub fn append(&mut self, message: InboundMessage) -> bool {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(message);
        self.is_ready()
    }

    pub fn is_ready(&self) -> bool {
        self.buffer.len() == self.capacity
    }

    /// Buffered texts in arrival order, blank entries skipped.
    pub fn contents(&self) -> Vec<&str> {
        self.buffer
            .iter()
            .map(|m| m.text.as_str())
            .filter(|t| !t.trim().is_empty())
            .collect()
    }

    /// Apply the policy after a pass.
    pub fn settle(&mut self) {
        if self.policy == WindowPolicy::Drain {
            self.buffer.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> WindowPolicy {
        self.policy
    }
}
