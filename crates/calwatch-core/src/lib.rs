pub mod errors;
pub mod event;
pub mod ids;
pub mod messages;
pub mod provider;
pub mod transport;

pub use errors::GatewayError;
pub use event::{Event, EventDraft, EventStore, EventStoreError};
pub use ids::{ConversationId, EventId};
pub use messages::{InboundMessage, PromptMessage, PromptRole};
pub use provider::ExtractionProvider;
pub use transport::{RecordingTransport, Transport, TransportError};
