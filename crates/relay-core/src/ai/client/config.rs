//! AI Client configuration
//!
//! Provider-agnostic configuration for the LLM HTTP client.

use std::collections::HashMap;

use crate::ai::format::ApiFormat;
use crate::constants;

/// Configuration for the AI client
#[derive(Debug, Clone)]
pub struct AiClientConfig {
    /// Model ID to use for API calls
    pub model: String,
    /// Maximum output tokens
    pub max_tokens: usize,
    /// Optional base URL override (defaults per API format)
    pub base_url: Option<String>,
    /// Request/response shape
    pub api_format: ApiFormat,
    /// Custom headers to send with requests
    pub custom_headers: HashMap<String, String>,
}

impl Default for AiClientConfig {
    fn default() -> Self {
        Self {
            model: constants::ai::DEFAULT_MODEL.to_string(),
            max_tokens: constants::ai::MAX_OUTPUT_TOKENS,
            base_url: None,
            api_format: ApiFormat::OpenAI,
            custom_headers: HashMap::new(),
        }
    }
}

impl AiClientConfig {
    /// Get the API URL to use
    pub fn api_url(&self) -> String {
        if let Some(base) = &self.base_url {
            return base.clone();
        }
        match self.api_format {
            ApiFormat::OpenAI => constants::ai::OPENAI_CHAT_API.to_string(),
            ApiFormat::Anthropic => constants::ai::ANTHROPIC_MESSAGES_API.to_string(),
        }
    }

    pub fn uses_anthropic_api(&self) -> bool {
        self.api_format == ApiFormat::Anthropic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_defaults_per_format() {
        let mut config = AiClientConfig::default();
        assert_eq!(config.api_url(), constants::ai::OPENAI_CHAT_API);

        config.api_format = ApiFormat::Anthropic;
        assert_eq!(config.api_url(), constants::ai::ANTHROPIC_MESSAGES_API);

        config.base_url = Some("http://localhost:11434/v1/chat/completions".to_string());
        assert_eq!(config.api_url(), "http://localhost:11434/v1/chat/completions");
    }
}
