use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! branded_id {
    ($name:ident, $prefix:expr) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

// Conversation ids normally come from the transport (chat ids) via `from_raw`.
branded_id!(ConversationId, "conv");
branded_id!(EventId, "evt");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_have_prefix() {
        assert!(ConversationId::new().as_str().starts_with("conv_"));
        assert!(EventId::new().as_str().starts_with("evt_"));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(EventId::new(), EventId::new());
    }

    #[test]
    fn transport_ids_preserved() {
        let id = ConversationId::from_raw("-100123456");
        assert_eq!(id.as_str(), "-100123456");
        assert_eq!(id.to_string(), "-100123456");
    }

    #[test]
    fn serializes_transparently() {
        let id = ConversationId::from_raw("chat-42");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""chat-42""#);
        let parsed: ConversationId = "chat-42".parse().unwrap();
        assert_eq!(parsed, id);
    }
}
