//! Prompt construction for the extraction capability.
//!
//! The system prompt wording and the JSON schema inside it are the contract
//! the extraction model is tuned against; change them together with
//! `response::parse_response`.

use std::fmt::{Display, Write};

use chrono::{DateTime, TimeZone};

use calwatch_core::event::Event;
use calwatch_core::messages::PromptMessage;

pub const NO_EVENTS_SENTINEL: &str = "No previous events recorded.";

/// Day-first format used both for "current time" and in the example reply.
pub const CURRENT_TIME_FORMAT: &str = "%d.%m.%Y %H:%M";

const SYSTEM_PROMPT_HEAD: &str = "\
You are an event analyzer and manager that processes conversation messages and manages a calendar of events.
You will receive the current conversation messages and a list of previously recorded events.

Your task is to:
1. Analyze new messages for events
2. Check for conflicts or updates with existing events
3. Return a JSON object with the following fields:
   - action: \"add\" (new event), \"update\" (modify existing), \"delete\" (remove event), or \"none\" (no action needed)
   - event: brief description of the event
   - type: categorization (e.g., \"meeting\", \"task\", \"reminder\", \"social\", \"question\")
   - time: specific time/date or \"none\". Convert relative times (e.g., \"tomorrow\") to absolute dates
   - conflicts: array of indices of conflicting events from the previous events list (empty if none)
   - update_index: if updating/deleting, index of event to modify (from previous events list)
";

const SYSTEM_PROMPT_EXAMPLE: &str = r#"Example response:
{
    "action": "add",
    "event": "team meeting discussion",
    "type": "meeting",
    "time": "18:00 22.01.2025",
    "conflicts": [2],
    "update_index": null
}
"#;

/// Render the previously recorded events, numbered from 1 in insertion order.
pub fn format_events_context(events: &[Event]) -> String {
    if events.is_empty() {
        return NO_EVENTS_SENTINEL.to_string();
    }

    let mut out = String::from("Previously recorded events:\n");
    for (idx, event) in events.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. Event: {}, Type: {}, Time: {}",
            idx + 1,
            event.description,
            event.category,
            event.time
        );
    }
    out
}

/// Full system instruction for one pass.
pub fn system_prompt<Tz>(events: &[Event], now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!(
        "{SYSTEM_PROMPT_HEAD}\nCurrent time is: {}\n\n{}\n\n{SYSTEM_PROMPT_EXAMPLE}",
        now.format(CURRENT_TIME_FORMAT),
        format_events_context(events),
    )
}

/// System instruction followed by the window texts joined by newlines.
pub fn build_prompt<Tz>(events: &[Event], window_texts: &[&str], now: &DateTime<Tz>) -> Vec<PromptMessage>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    vec![
        PromptMessage::system(system_prompt(events, now)),
        PromptMessage::user(window_texts.join("\n")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use calwatch_core::event::{EventDraft, EventStore};
    use calwatch_core::messages::PromptRole;
    use chrono::Utc;

    fn three_events() -> EventStore {
        let mut store = EventStore::new();
        store.add(EventDraft::new("Team sync", "meeting", "10:00 20.01.2025"), Utc::now());
        store.add(EventDraft::new("Buy milk", "task", "none"), Utc::now());
        store.add(EventDraft::new("Lunch with Sam", "social", "12:00 21.01.2025"), Utc::now());
        store
    }

    #[test]
    fn empty_list_renders_sentinel() {
        assert_eq!(format_events_context(&[]), NO_EVENTS_SENTINEL);
    }

    #[test]
    fn three_events_render_three_numbered_lines() {
        let store = three_events();
        let text = format_events_context(store.as_slice());
        let numbered: Vec<&str> = text
            .lines()
            .filter(|l| l.chars().next().is_some_and(|c| c.is_ascii_digit()))
            .collect();
        assert_eq!(
            numbered,
            [
                "1. Event: Team sync, Type: meeting, Time: 10:00 20.01.2025",
                "2. Event: Buy milk, Type: task, Time: none",
                "3. Event: Lunch with Sam, Type: social, Time: 12:00 21.01.2025",
            ]
        );
    }

    #[test]
    fn formatting_is_stable() {
        let store = three_events();
        assert_eq!(
            format_events_context(store.as_slice()),
            format_events_context(store.as_slice())
        );
    }

    #[test]
    fn prompt_layout() {
        let now = Utc.with_ymd_and_hms(2025, 1, 21, 9, 30, 0).unwrap();
        let store = three_events();
        let prompt = build_prompt(store.as_slice(), &["Lunch tomorrow at noon", "with Sam"], &now);

        assert_eq!(prompt.len(), 2);
        assert_eq!(prompt[0].role, PromptRole::System);
        assert!(prompt[0].content.contains("Current time is: 21.01.2025 09:30"));
        assert!(prompt[0].content.contains("1. Event: Team sync"));
        assert!(prompt[0].content.contains("\"update_index\": null"));
        assert_eq!(prompt[1].role, PromptRole::User);
        assert_eq!(prompt[1].content, "Lunch tomorrow at noon\nwith Sam");
    }

    #[test]
    fn prompt_without_events_mentions_sentinel() {
        let now = Utc.with_ymd_and_hms(2025, 1, 21, 9, 30, 0).unwrap();
        let prompt = build_prompt(&[], &["hi"], &now);
        assert!(prompt[0].content.contains(NO_EVENTS_SENTINEL));
    }
}
