//! Agent configuration (`config.toml`)
//!
//! ```toml
//! [llm]
//! api_format = "anthropic"
//! model = "claude-sonnet-4-5"
//! api_key_env = "ANTHROPIC_API_KEY"
//!
//! [agent]
//! max_errors = 5
//!
//! [timeouts]
//! invoke = 90
//! ```
//!
//! Every key is optional. `RELAY_MODEL`, `RELAY_BASE_URL` and `RELAY_API_KEY`
//! override the file.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ai::{AiClientConfig, ApiFormat};
use crate::constants;
use crate::graph::RunLimits;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub api_format: ApiFormat,
    pub base_url: Option<String>,
    pub model: String,
    pub max_tokens: usize,
    /// Environment variable holding the API key
    pub api_key_env: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_format: ApiFormat::default(),
            base_url: None,
            model: constants::ai::DEFAULT_MODEL.to_string(),
            max_tokens: constants::ai::MAX_OUTPUT_TOKENS,
            api_key_env: constants::ai::DEFAULT_API_KEY_ENV.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub max_iterations: u64,
    pub max_errors: u64,
    pub system_instructions: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: constants::agent::MAX_ITERATIONS,
            max_errors: constants::agent::MAX_ERRORS,
            system_instructions: constants::agent::DEFAULT_SYSTEM_INSTRUCTIONS.to_string(),
        }
    }
}

/// Per-operation timeouts, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub llm: u64,
    pub connect: u64,
    pub list_tools: u64,
    pub invoke: u64,
    pub user_input: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        use constants::timeouts::*;
        Self {
            llm: LLM_SECS,
            connect: CONNECT_SECS,
            list_tools: LIST_TOOLS_SECS,
            invoke: INVOKE_SECS,
            user_input: USER_INPUT_SECS,
        }
    }
}

impl Timeouts {
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect)
    }

    pub fn list_tools_timeout(&self) -> Duration {
        Duration::from_secs(self.list_tools)
    }

    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_secs(self.invoke)
    }

    pub fn user_input_timeout(&self) -> Duration {
        Duration::from_secs(self.user_input)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub llm: LlmSettings,
    pub agent: AgentSettings,
    pub timeouts: Timeouts,
}

impl RelayConfig {
    /// Load from `path`; a missing file yields defaults
    pub async fn load(path: &Path) -> Result<Self> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {:?}, using defaults", path);
                return Ok(Self::default());
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
        };
        let config =
            Self::from_toml(&content).with_context(|| format!("Failed to parse {:?}", path))?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `RELAY_MODEL` and `RELAY_BASE_URL`
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(model) = set("RELAY_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = set("RELAY_BASE_URL") {
            self.llm.base_url = Some(url);
        }
    }

    /// `RELAY_API_KEY`, else the variable named by `llm.api_key_env`
    pub fn api_key(&self) -> Option<String> {
        ["RELAY_API_KEY", self.llm.api_key_env.as_str()]
            .into_iter()
            .filter_map(|key| std::env::var(key).ok())
            .find(|v| !v.is_empty())
    }

    pub fn client_config(&self) -> AiClientConfig {
        AiClientConfig {
            model: self.llm.model.clone(),
            max_tokens: self.llm.max_tokens,
            base_url: self.llm.base_url.clone(),
            api_format: self.llm.api_format,
            ..Default::default()
        }
    }

    pub fn run_limits(&self) -> RunLimits {
        RunLimits {
            max_iterations: self.agent.max_iterations,
            max_errors: self.agent.max_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = RelayConfig::from_toml("").unwrap();
        assert_eq!(config, RelayConfig::default());
        assert_eq!(config.run_limits().max_iterations, 25);
        assert_eq!(config.run_limits().max_errors, 3);
        assert_eq!(config.timeouts.invoke_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = RelayConfig::from_toml(
            r#"
            [llm]
            api_format = "anthropic"
            model = "claude-sonnet-4-5"

            [timeouts]
            invoke = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.llm.api_format, ApiFormat::Anthropic);
        assert_eq!(config.llm.max_tokens, constants::ai::MAX_OUTPUT_TOKENS);
        assert_eq!(config.timeouts.invoke, 5);
        assert_eq!(config.timeouts.llm, 120);
        assert!(config.client_config().uses_anthropic_api());
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(RelayConfig::from_toml("[llm\nmodel = 1").is_err());
        assert!(RelayConfig::from_toml("[agent]\nmax_errors = \"three\"").is_err());
    }

    #[test]
    fn overrides_replace_model_and_url() {
        let mut config = RelayConfig::default();
        config.apply_overrides(|key| match key {
            "RELAY_MODEL" => Some("local-model".to_string()),
            "RELAY_BASE_URL" => Some("http://localhost:8080/v1/chat/completions".to_string()),
            _ => None,
        });
        assert_eq!(config.llm.model, "local-model");
        assert_eq!(
            config.client_config().api_url(),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn load_reads_file_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(RelayConfig::load(&path).await.unwrap(), RelayConfig::default());

        tokio::fs::write(&path, "[agent]\nmax_iterations = 7\n")
            .await
            .unwrap();
        let config = RelayConfig::load(&path).await.unwrap();
        assert_eq!(config.agent.max_iterations, 7);
    }
}
