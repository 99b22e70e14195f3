pub mod context;
pub mod dispatcher;
pub mod error;
pub mod reconcile;
pub mod response;
pub mod state;
pub mod window;

pub use dispatcher::{ConversationSnapshot, DispatchOutcome, Dispatcher};
pub use error::EngineError;
pub use reconcile::{AnalysisReport, AppliedChange, EngineConfig, ReconciliationEngine};
pub use response::{Action, ExtractionResult};
pub use state::{ConversationPhase, ConversationState};
pub use window::{MessageWindow, WindowPolicy};
