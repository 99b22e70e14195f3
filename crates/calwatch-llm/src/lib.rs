pub mod chat;
pub mod mock;

pub use chat::{ChatCompletionsConfig, ChatCompletionsProvider};
pub use mock::{MockProvider, MockResponse};
