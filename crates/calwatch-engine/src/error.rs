use calwatch_core::errors::GatewayError;

/// Why an analysis pass was aborted. No variant leaves partial mutations
/// behind: every error is raised before the event list is touched.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("extraction capability unavailable: {0}")]
    CapabilityUnavailable(#[from] GatewayError),

    #[error("malformed extraction response: {reason}")]
    MalformedResponse { reason: String, raw: String },

    #[error("{field} index {index} outside 1..={len}")]
    InvalidIndex {
        field: &'static str,
        index: i64,
        len: usize,
    },

    /// The task running the pass was cancelled before it finished.
    #[error("analysis pass interrupted")]
    Interrupted,
}

impl EngineError {
    pub fn malformed(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::MalformedResponse {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    /// Short classification string for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CapabilityUnavailable(_) => "capability_unavailable",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::InvalidIndex { .. } => "invalid_index",
            Self::Interrupted => "interrupted",
        }
    }

    /// True when the capability answered but the answer could not be applied.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::MalformedResponse { .. } | Self::InvalidIndex { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn kinds() {
        let e = EngineError::from(GatewayError::Timeout(Duration::from_secs(1)));
        assert_eq!(e.kind(), "capability_unavailable");
        assert!(!e.is_validation());

        let e = EngineError::malformed("not json", "hello");
        assert_eq!(e.kind(), "malformed_response");
        assert!(e.is_validation());

        let e = EngineError::InvalidIndex {
            field: "update_index",
            index: 4,
            len: 2,
        };
        assert_eq!(e.kind(), "invalid_index");
        assert!(e.is_validation());
        assert_eq!(e.to_string(), "update_index index 4 outside 1..=2");

        assert_eq!(EngineError::Interrupted.kind(), "interrupted");
        assert!(!EngineError::Interrupted.is_validation());
    }
}
