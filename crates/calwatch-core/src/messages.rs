use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptRole {
    System,
    User,
}

/// One entry of the ordered prompt handed to the extraction capability.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }
}

/// A raw message delivered by the transport for one conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            timestamp,
        }
    }

    /// Convenience for messages received right now.
    pub fn now(text: impl Into<String>) -> Self {
        Self::new(text, Utc::now())
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_wire_names() {
        let json = serde_json::to_value(PromptMessage::system("x")).unwrap();
        assert_eq!(json["role"], "system");
        let json = serde_json::to_value(PromptMessage::user("y")).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "y");
    }

    #[test]
    fn blank_detection() {
        assert!(InboundMessage::now("").is_blank());
        assert!(InboundMessage::now("  \n").is_blank());
        assert!(!InboundMessage::now("lunch?").is_blank());
    }
}
