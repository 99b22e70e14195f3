use async_trait::async_trait;

use crate::errors::GatewayError;
use crate::messages::PromptMessage;

/// The extraction capability: turns an ordered prompt into free-form text
/// that is expected to contain one JSON object.
#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    async fn invoke(&self, messages: &[PromptMessage]) -> Result<String, GatewayError>;
}
