//! OpenAI-compatible chat-completions provider.
//!
//! Most hosted model gateways and local inference servers accept this
//! request shape, so a single non-streaming client covers them.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::instrument;

use calwatch_core::errors::GatewayError;
use calwatch_core::messages::{PromptMessage, PromptRole};
use calwatch_core::provider::ExtractionProvider;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct ChatCompletionsConfig {
    /// Base URL up to and including the API version, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub model: String,
    pub api_key: Option<SecretString>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

pub struct ChatCompletionsProvider {
    client: Client,
    config: ChatCompletionsConfig,
    endpoint: String,
}

impl ChatCompletionsProvider {
    pub fn new(config: ChatCompletionsConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::InvalidRequest(format!("failed to build HTTP client: {e}")))?;
        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            config,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Build the JSON request body for a chat-completions call.
pub fn build_request_body(
    model: &str,
    messages: &[PromptMessage],
    temperature: Option<f64>,
    max_tokens: Option<u32>,
) -> Value {
    let messages: Vec<Value> = messages
        .iter()
        .map(|m| {
            let role = match m.role {
                PromptRole::System => "system",
                PromptRole::User => "user",
            };
            json!({ "role": role, "content": m.content })
        })
        .collect();

    let mut body = json!({
        "model": model,
        "messages": messages,
    });
    if let Some(t) = temperature {
        body["temperature"] = json!(t);
    }
    if let Some(n) = max_tokens {
        body["max_tokens"] = json!(n);
    }
    body
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Extract the first choice's text from a chat-completions response body.
pub fn parse_completion(body: &str) -> Result<String, GatewayError> {
    let parsed: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| GatewayError::InvalidRequest(format!("unexpected response body: {e}")))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or(GatewayError::EmptyResponse)
}

#[async_trait]
impl ExtractionProvider for ChatCompletionsProvider {
    fn name(&self) -> &str {
        "chat_completions"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip(self, messages), fields(model = %self.config.model))]
    async fn invoke(&self, messages: &[PromptMessage]) -> Result<String, GatewayError> {
        let body = build_request_body(
            &self.config.model,
            messages,
            self.config.temperature,
            self.config.max_tokens,
        );

        let mut req = self
            .client
            .post(&self.endpoint)
            .header("accept", "application/json")
            .json(&body);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key.expose_secret());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| GatewayError::NetworkError(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| GatewayError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            return Err(GatewayError::from_status(status.as_u16(), text));
        }

        tracing::debug!(bytes = text.len(), "completion received");
        parse_completion(&text)
    }
}
