use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use calwatch_core::errors::GatewayError;
use calwatch_core::messages::PromptMessage;
use calwatch_core::provider::ExtractionProvider;

/// Pre-programmed responses for deterministic testing without API calls.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Return this text verbatim.
    Text(String),
    /// Fail the invoke() call.
    Error(GatewayError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn text(text: &str) -> Self {
        Self::Text(text.to_string())
    }

    /// Serialize a JSON value as the response body.
    pub fn json(value: &serde_json::Value) -> Self {
        Self::Text(value.to_string())
    }

    /// The same JSON wrapped in a markdown code fence, as chat models often reply.
    pub fn fenced_json(value: &serde_json::Value) -> Self {
        Self::Text(format!("```json\n{value}\n```"))
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock provider that returns pre-programmed responses in sequence and
/// captures every prompt it receives.
pub struct MockProvider {
    responses: Vec<MockResponse>,
    call_count: AtomicUsize,
    prompts: Mutex<Vec<Vec<PromptMessage>>>,
}

impl MockProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses,
            call_count: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<Vec<PromptMessage>> {
        self.prompts.lock().clone()
    }

    pub fn last_prompt(&self) -> Option<Vec<PromptMessage>> {
        self.prompts.lock().last().cloned()
    }
}

#[async_trait]
impl ExtractionProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn invoke(&self, messages: &[PromptMessage]) -> Result<String, GatewayError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        self.prompts.lock().push(messages.to_vec());

        let Some(response) = self.responses.get(idx) else {
            return Err(GatewayError::InvalidRequest(format!(
                "MockProvider: no response configured for call {idx}"
            )));
        };

        resolve_response(response).await
    }
}

/// Unrolls nested delays iteratively to avoid recursive async.
async fn resolve_response(response: &MockResponse) -> Result<String, GatewayError> {
    let mut current = response;
    loop {
        match current {
            MockResponse::Text(text) => return Ok(text.clone()),
            MockResponse::Error(e) => return Err(e.clone()),
            MockResponse::Delay(duration, inner) => {
                tokio::time::sleep(*duration).await;
                current = inner;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn text_response() {
        let mock = MockProvider::new(vec![MockResponse::text("hello world")]);
        let out = mock.invoke(&[PromptMessage::user("hi")]).await.unwrap();
        assert_eq!(out, "hello world");
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn fenced_json_wraps_body() {
        let body = serde_json::json!({"action": "none"});
        let mock = MockProvider::new(vec![MockResponse::fenced_json(&body)]);
        let out = mock.invoke(&[]).await.unwrap();
        assert!(out.starts_with("```json\n"));
        assert!(out.ends_with("\n```"));
        assert!(out.contains(r#""action":"none""#));
    }

    #[tokio::test]
    async fn error_response() {
        let mock = MockProvider::new(vec![MockResponse::Error(
            GatewayError::AuthenticationFailed("bad".into()),
        )]);
        let result = mock.invoke(&[]).await;
        assert!(matches!(result, Err(GatewayError::AuthenticationFailed(_))));
    }

    #[tokio::test]
    async fn exhausted_responses() {
        let mock = MockProvider::new(vec![MockResponse::text("only one")]);
        let _ = mock.invoke(&[]).await;
        let result = mock.invoke(&[]).await;
        assert!(result.is_err());
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn captures_prompts_in_order() {
        let mock = MockProvider::new(vec![MockResponse::text("a"), MockResponse::text("b")]);
        mock.invoke(&[PromptMessage::system("s1"), PromptMessage::user("u1")])
            .await
            .unwrap();
        mock.invoke(&[PromptMessage::user("u2")]).await.unwrap();

        let prompts = mock.prompts();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[0].len(), 2);
        assert_eq!(mock.last_prompt().unwrap()[0].content, "u2");
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_response() {
        let mock = MockProvider::new(vec![MockResponse::delayed(
            Duration::from_secs(5),
            MockResponse::text("after delay"),
        )]);

        let start = tokio::time::Instant::now();
        let out = mock.invoke(&[]).await.unwrap();
        assert_eq!(out, "after delay");
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[test]
    fn provider_properties() {
        let mock = MockProvider::new(vec![]);
        assert_eq!(mock.name(), "mock");
        assert_eq!(mock.model(), "mock-model");
    }
}
