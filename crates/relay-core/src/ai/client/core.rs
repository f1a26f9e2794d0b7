//! HTTP client for the configured LLM endpoint
//!
//! One non-streaming request per call: the response carries the final text
//! and/or the tool calls the model wants executed.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use super::config::AiClientConfig;
use crate::ai::error::LlmError;
use crate::ai::format::{handler_for, FormatHandler, RequestOptions};
use crate::ai::types::{LlmRequest, LlmResponse};
use crate::ai::LanguageModel;
use crate::constants;

/// LLM client for one endpoint and model
pub struct AiClient {
    http: reqwest::Client,
    config: AiClientConfig,
    api_key: String,
    format: Box<dyn FormatHandler>,
}

impl AiClient {
    pub fn new(config: AiClientConfig, api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        let format = handler_for(config.api_format);
        Self {
            http,
            config,
            api_key,
            format,
        }
    }

    pub fn config(&self) -> &AiClientConfig {
        &self.config
    }

    /// Build the JSON body for a request (exposed for inspection and tests)
    pub fn request_body(&self, request: &LlmRequest) -> Value {
        let messages = self.format.convert_messages(&request.messages);
        let options = RequestOptions {
            max_tokens: self.config.max_tokens,
            system_prompt: request.system.as_deref(),
            tools: &request.tools,
        };
        self.format
            .build_request_body(&self.config.model, messages, &options)
    }

    fn build_request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .http
            .post(url)
            .header("content-type", "application/json");

        request = if self.config.uses_anthropic_api() {
            request
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", constants::ai::ANTHROPIC_API_VERSION)
        } else {
            request.bearer_auth(&self.api_key)
        };

        for (key, value) in &self.config.custom_headers {
            request = request.header(key, value);
        }

        request
    }

    async fn handle_error_response(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, LlmError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();

        let mut error = LlmError::from_status(status.as_u16(), &body);
        if let Some(delay) = retry_after {
            error = error.with_retry_after(delay);
        }
        Err(error)
    }
}

#[async_trait]
impl LanguageModel for AiClient {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = self.request_body(&request);
        let url = self.config.api_url();

        info!(
            model = %self.config.model,
            format = %self.config.api_format,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "LLM call starting"
        );
        let start = Instant::now();

        let response = self
            .build_request(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::network(format!("API request failed: {}", e)))?;

        let response = self.handle_error_response(response).await?;
        let json: Value = response
            .json()
            .await
            .map_err(|e| LlmError::invalid_response(format!("Invalid JSON body: {}", e)))?;

        let parsed = self
            .format
            .parse_response(&json)
            .map_err(|e| LlmError::invalid_response(e.to_string()))?;

        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            tool_calls = parsed.tool_calls.len(),
            prompt_tokens = parsed.usage.prompt_tokens,
            completion_tokens = parsed.usage.completion_tokens,
            "LLM call complete"
        );

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::format::ApiFormat;
    use crate::ai::types::{AiTool, ModelMessage};
    use serde_json::json;

    fn request() -> LlmRequest {
        LlmRequest {
            system: Some("You drive the desktop.".to_string()),
            messages: vec![ModelMessage::user_text("open github in safari")],
            tools: vec![AiTool {
                name: "open_url".to_string(),
                description: "Open a URL".to_string(),
                input_schema: json!({"type": "object"}),
            }],
        }
    }

    #[test]
    fn openai_body_puts_system_first() {
        let client = AiClient::new(AiClientConfig::default(), "key".to_string());
        let body = client.request_body(&request());
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "open github in safari");
        assert_eq!(body["tools"][0]["function"]["name"], "open_url");
    }

    #[test]
    fn anthropic_body_uses_system_field() {
        let config = AiClientConfig {
            api_format: ApiFormat::Anthropic,
            ..Default::default()
        };
        let client = AiClient::new(config, "key".to_string());
        let body = client.request_body(&request());
        assert_eq!(body["system"], "You drive the desktop.");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
    }
}
