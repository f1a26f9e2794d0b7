//! Provider wire formats
//!
//! Each handler converts domain messages and tools into one provider's
//! request body and parses that provider's response back into an
//! `LlmResponse`.

pub mod anthropic;
pub mod openai;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ai::types::{AiTool, LlmResponse, ModelMessage};

/// Request shape selected by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFormat {
    /// OpenAI chat/completions (also most OpenAI-compatible gateways)
    #[default]
    #[serde(rename = "openai")]
    OpenAI,
    /// Anthropic messages
    Anthropic,
}

impl std::fmt::Display for ApiFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiFormat::OpenAI => write!(f, "openai"),
            ApiFormat::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// Options common to both request formats
pub struct RequestOptions<'a> {
    pub max_tokens: usize,
    pub system_prompt: Option<&'a str>,
    pub tools: &'a [AiTool],
}

pub trait FormatHandler: Send + Sync {
    fn convert_messages(&self, messages: &[ModelMessage]) -> Vec<Value>;

    /// Field renaming only: the JSON schema itself passes through untouched
    fn convert_tools(&self, tools: &[AiTool]) -> Vec<Value>;

    fn build_request_body(
        &self,
        model: &str,
        messages: Vec<Value>,
        options: &RequestOptions<'_>,
    ) -> Value;

    fn parse_response(&self, json: &Value) -> anyhow::Result<LlmResponse>;
}

pub fn handler_for(format: ApiFormat) -> Box<dyn FormatHandler> {
    match format {
        ApiFormat::OpenAI => Box::new(openai::OpenAIFormat),
        ApiFormat::Anthropic => Box::new(anthropic::AnthropicFormat),
    }
}

/// Tool arguments arrive as a JSON-encoded string in OpenAI responses.
/// Empty or invalid payloads become an empty object so the call still routes.
pub(crate) fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Unparsable tool arguments ({}): {}", e, raw);
            Value::Object(Default::default())
        }
    }
}

pub(crate) fn output_to_string(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
