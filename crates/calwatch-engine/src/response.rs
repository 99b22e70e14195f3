//! Parsing and validation of the extraction capability's reply.
//!
//! The reply is free-form text that should contain one JSON object shaped as
//! `{action, event, type, time, conflicts, update_index}`. Parsing is
//! tolerant about wrappers (code fences, surrounding prose) but strict about
//! fields and indices: anything that could lead to a wrong mutation is
//! rejected before the event list is touched.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use calwatch_core::event::{EventDraft, TIME_NONE};

use crate::error::EngineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Add,
    Update,
    Delete,
    None,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::None => "none",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "add" => Some(Self::Add),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

/// A validated reply. Indices are 1-based and were checked against the event
/// list length at parse time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub action: Action,
    /// Always present for add/update; present for none only when the reply
    /// carried a complete event.
    pub draft: Option<EventDraft>,
    pub conflicts: Vec<usize>,
    /// Present exactly for update/delete.
    pub target_index: Option<usize>,
}

/// Wire shape before validation. Everything is optional so that a missing
/// field is reported by name rather than as a serde error.
#[derive(Debug, Deserialize)]
struct RawExtraction {
    action: Option<String>,
    event: Option<String>,
    #[serde(rename = "type")]
    category: Option<String>,
    #[serde(default, deserialize_with = "present")]
    time: Option<Value>,
    conflicts: Option<Vec<i64>>,
    update_index: Option<i64>,
}

/// Keeps an explicit `null` distinguishable from a missing field.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// Parse `raw` and validate it against an event list of length `event_count`.
pub fn parse_response(raw: &str, event_count: usize) -> Result<ExtractionResult, EngineError> {
    let wire = decode(raw).map_err(|reason| EngineError::malformed(reason, raw))?;
    validate(wire, event_count, raw)
}

/// Direct parse, then fence-stripped, then the outermost brace span.
fn decode(raw: &str) -> Result<RawExtraction, String> {
    let trimmed = raw.trim();
    let candidates = [
        Some(trimmed),
        Some(strip_code_fences(trimmed)),
        brace_span(trimmed),
    ];

    let mut last_error = String::from("empty response");
    for candidate in candidates.into_iter().flatten() {
        match serde_json::from_str::<RawExtraction>(candidate) {
            Ok(wire) => return Ok(wire),
            Err(e) => last_error = format!("invalid JSON: {e}"),
        }
    }
    Err(last_error)
}

/// Strip markdown code fences from a response string.
fn strip_code_fences(s: &str) -> &str {
    if let Some(rest) = s.strip_prefix("```json") {
        rest.strip_suffix("```").unwrap_or(rest).trim()
    } else if let Some(rest) = s.strip_prefix("```") {
        rest.strip_suffix("```").unwrap_or(rest).trim()
    } else {
        s
    }
}

fn brace_span(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (start < end).then(|| &s[start..=end])
}

fn validate(wire: RawExtraction, event_count: usize, raw: &str) -> Result<ExtractionResult, EngineError> {
    let action_text = wire
        .action
        .as_deref()
        .ok_or_else(|| EngineError::malformed("missing 'action'", raw))?;
    let action = Action::parse(action_text)
        .ok_or_else(|| EngineError::malformed(format!("unknown action '{action_text}'"), raw))?;

    let conflicts = wire
        .conflicts
        .as_deref()
        .ok_or_else(|| EngineError::malformed("missing 'conflicts'", raw))?;
    let conflicts = checked_indices(conflicts, event_count)?;

    let draft = match action {
        Action::Add | Action::Update => Some(required_draft(&wire, raw)?),
        Action::Delete | Action::None => optional_draft(&wire),
    };

    let target_index = match action {
        Action::Update | Action::Delete => {
            let index = wire
                .update_index
                .ok_or_else(|| EngineError::malformed("missing 'update_index'", raw))?;
            Some(checked_index("update_index", index, event_count)?)
        }
        Action::Add | Action::None => None,
    };

    Ok(ExtractionResult {
        action,
        draft,
        conflicts,
        target_index,
    })
}

fn checked_index(field: &'static str, index: i64, len: usize) -> Result<usize, EngineError> {
    usize::try_from(index)
        .ok()
        .filter(|i| (1..=len).contains(i))
        .ok_or(EngineError::InvalidIndex { field, index, len })
}

/// Range-check every conflict index and drop duplicates, keeping first-seen order.
fn checked_indices(indices: &[i64], len: usize) -> Result<Vec<usize>, EngineError> {
    let mut out = Vec::with_capacity(indices.len());
    for &index in indices {
        let i = checked_index("conflicts", index, len)?;
        if !out.contains(&i) {
            out.push(i);
        }
    }
    Ok(out)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// `null` or blank time means no time. Non-string values are rejected.
fn time_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(TIME_NONE.to_string()),
        Value::String(s) if s.trim().is_empty() => Some(TIME_NONE.to_string()),
        Value::String(s) => Some(s.trim().to_string()),
        _ => None,
    }
}

fn required_draft(wire: &RawExtraction, raw: &str) -> Result<EventDraft, EngineError> {
    let description = non_empty(wire.event.as_deref())
        .ok_or_else(|| EngineError::malformed("missing or empty 'event'", raw))?;
    let category = non_empty(wire.category.as_deref())
        .ok_or_else(|| EngineError::malformed("missing or empty 'type'", raw))?;
    let time = wire
        .time
        .as_ref()
        .ok_or_else(|| EngineError::malformed("missing 'time'", raw))?;
    let time = time_value(time).ok_or_else(|| EngineError::malformed("'time' must be a string", raw))?;
    Ok(EventDraft {
        description,
        category,
        time,
    })
}

fn optional_draft(wire: &RawExtraction) -> Option<EventDraft> {
    let description = non_empty(wire.event.as_deref())?;
    let category = non_empty(wire.category.as_deref())?;
    let time = wire
        .time
        .as_ref()
        .and_then(time_value)
        .unwrap_or_else(|| TIME_NONE.to_string());
    Some(EventDraft {
        description,
        category,
        time,
    })
}
