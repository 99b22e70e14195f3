use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::EventId;

/// Sentinel used for events with no resolvable time.
pub const TIME_NONE: &str = "none";

/// The description/category/time triple carried by add and update actions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    pub description: String,
    pub category: String,
    pub time: String,
}

impl EventDraft {
    pub fn new(
        description: impl Into<String>,
        category: impl Into<String>,
        time: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            category: category.into(),
            time: time.into(),
        }
    }
}

/// One recorded calendar item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub description: String,
    pub category: String,
    pub time: String,
    pub recorded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Event {
    fn from_draft(draft: EventDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: EventId::new(),
            description: draft.description,
            category: draft.category,
            time: draft.time,
            recorded_at: now,
            updated_at: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EventStoreError {
    #[error("event index {index} out of range 1..={len}")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Ordered per-conversation event list.
///
/// Indices exposed by this type are 1-based, matching the numbering shown to
/// the extraction service. Removing an entry shifts every later entry down by
/// one, so indices must not be cached across mutations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn as_slice(&self) -> &[Event] {
        &self.events
    }

    pub fn get(&self, index: usize) -> Option<&Event> {
        index.checked_sub(1).and_then(|i| self.events.get(i))
    }

    pub fn contains_index(&self, index: usize) -> bool {
        (1..=self.events.len()).contains(&index)
    }

    fn position(&self, index: usize) -> Result<usize, EventStoreError> {
        if self.contains_index(index) {
            Ok(index - 1)
        } else {
            Err(EventStoreError::IndexOutOfRange {
                index,
                len: self.events.len(),
            })
        }
    }

    /// Append a new event stamped with `now` as its creation time.
    pub fn add(&mut self, draft: EventDraft, now: DateTime<Utc>) -> &Event {
        self.events.push(Event::from_draft(draft, now));
        &self.events[self.events.len() - 1]
    }

    /// Replace description/category/time of the event at `index` in place.
    pub fn update(
        &mut self,
        index: usize,
        draft: EventDraft,
        now: DateTime<Utc>,
    ) -> Result<&Event, EventStoreError> {
        let pos = self.position(index)?;
        let event = &mut self.events[pos];
        event.description = draft.description;
        event.category = draft.category;
        event.time = draft.time;
        event.updated_at = Some(now);
        Ok(&*event)
    }

    /// Remove and return the event at `index`.
    pub fn remove(&mut self, index: usize) -> Result<Event, EventStoreError> {
        let pos = self.position(index)?;
        Ok(self.events.remove(pos))
    }
}
